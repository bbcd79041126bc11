/// テキスト前処理ユーティリティ。
///
/// 分類前のクリーニング、クラスタリング用の正規化（ストップワード除去・見出し語化）、
/// 文分割を提供します。
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"http\S+|www\S+|https\S+").expect("compile url regex"));
static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("compile tag regex"));
static NON_ALPHA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("compile alpha regex"));
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("compile word regex"));
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("compile space regex"));
static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.,!?])").expect("compile punct regex"));
static MISSING_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.,!?])\s*([A-Z])").expect("compile sentence regex"));

static STOPWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    ENGLISH_STOPWORDS.iter().copied().collect()
});

/// NLTK互換の英語ストップワード。
const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// 不規則な複数形。
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("mice", "mouse"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("lives", "life"),
    ("wives", "wife"),
    ("knives", "knife"),
    ("leaves", "leaf"),
    ("halves", "half"),
];

/// 末尾の `s` を落としてはいけない単数名詞。
const SINGULAR_EXCEPTIONS: &[&str] = &[
    "news", "series", "species", "politics", "economics", "physics", "mathematics", "always",
    "thus", "bus", "gas", "lens", "christmas", "yes", "perhaps", "whereas", "besides", "across",
    "chaos", "bias", "atlas", "canvas",
];

/// 記号を除去して小文字化する（分類前の要約クリーニング）。
#[must_use]
pub fn clean_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    NON_WORD_RE
        .replace_all(&composed, "")
        .to_lowercase()
        .trim()
        .to_string()
}

/// 小文字化し、URL・HTMLタグ・英字以外の文字を取り除く。
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = URL_RE.replace_all(&lowered, "");
    let without_tags = HTML_TAG_RE.replace_all(&without_urls, "");
    NON_ALPHA_RE
        .replace_all(&without_tags, "")
        .trim()
        .to_string()
}

/// クラスタリング用の正規化パイプライン。
///
/// 正規化 → 単語分割 → ストップワード除去 → 見出し語化 → 空白結合。
/// 学習時と分類時で同じ処理を通すこと。
#[must_use]
pub fn normalize_for_clustering(text: &str) -> String {
    let normalized = normalize_text(text);
    normalized
        .unicode_words()
        .filter(|word| !STOPWORDS.contains(word))
        .map(lemmatize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 名詞の複数形を単数形に寄せる簡易見出し語化。
#[must_use]
pub fn lemmatize(word: &str) -> String {
    if let Some((_, singular)) = IRREGULAR_PLURALS.iter().find(|(plural, _)| *plural == word) {
        return (*singular).to_string();
    }
    if word.len() <= 3 || SINGULAR_EXCEPTIONS.contains(&word) {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if stem.len() > 1 {
            return format!("{stem}y");
        }
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    for suffix in ["xes", "ches", "shes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !(word.ends_with("ss") || word.ends_with("us") || word.ends_with("is"))
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// テキストを文に分割する。
///
/// Unicode UAX#29に準拠した文境界検出を使用します。
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    text.unicode_sentences()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 生成された要約の空白と句読点を整える。
#[must_use]
pub fn postprocess_summary(summary: &str) -> String {
    let collapsed = MULTI_SPACE_RE.replace_all(summary, " ");
    let tightened = SPACE_BEFORE_PUNCT_RE.replace_all(&collapsed, "$1");
    MISSING_SPACE_RE
        .replace_all(&tightened, "$1 $2")
        .trim()
        .to_string()
}
