//! クラスタ番号とカテゴリ名の対応付け。
use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::ClusterIndex;

/// 対応が見つからずカテゴリも残っていないクラスタに付ける名前。
pub const FALLBACK_CATEGORY: &str = "unknown";

/// クラスタのキーワードとカテゴリのキーワードからラベル対応を作る。
pub trait CategoryMatcher: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `categories` の並び順はデータセット内の初出順。
    fn match_clusters(
        &self,
        clusters: &BTreeMap<ClusterIndex, Vec<String>>,
        categories: &[(String, Vec<String>)],
    ) -> BTreeMap<ClusterIndex, String>;
}

/// キーワード重複数による貪欲な一対一割り当て。
///
/// 大域最適ではない。先に処理したクラスタが、後のクラスタの方がより強く
/// 重なるカテゴリを取ってしまうことがある。
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyKeywordMatcher;

impl CategoryMatcher for GreedyKeywordMatcher {
    fn name(&self) -> &str {
        "greedy-keyword-overlap"
    }

    fn match_clusters(
        &self,
        clusters: &BTreeMap<ClusterIndex, Vec<String>>,
        categories: &[(String, Vec<String>)],
    ) -> BTreeMap<ClusterIndex, String> {
        match_clusters_to_categories(clusters, categories)
    }
}

/// クラスタ番号順に、未割り当てカテゴリの中でキーワード重複が最大のものを割り当てる。
///
/// 重複数は厳密に大きい場合のみ更新するため、同数ならカテゴリ順で先のものが勝つ。
/// 重複が0なら残っている最初のカテゴリ、残りが無ければ `"unknown"`。
#[must_use]
pub fn match_clusters_to_categories(
    clusters: &BTreeMap<ClusterIndex, Vec<String>>,
    categories: &[(String, Vec<String>)],
) -> BTreeMap<ClusterIndex, String> {
    let category_sets: Vec<(&str, FxHashSet<&str>)> = categories
        .iter()
        .map(|(name, words)| (name.as_str(), words.iter().map(String::as_str).collect()))
        .collect();

    let mut assigned: FxHashSet<&str> = FxHashSet::default();
    let mut mapping = BTreeMap::new();

    for (&cluster, words) in clusters {
        let cluster_words: FxHashSet<&str> = words.iter().map(String::as_str).collect();

        let mut best_match: Option<&str> = None;
        let mut max_overlap = 0;
        for (category, category_words) in &category_sets {
            if assigned.contains(category) {
                continue;
            }
            let overlap = cluster_words.intersection(category_words).count();
            if overlap > max_overlap {
                max_overlap = overlap;
                best_match = Some(*category);
            }
        }

        let chosen = best_match
            .or_else(|| {
                category_sets
                    .iter()
                    .map(|(category, _)| *category)
                    .find(|category| !assigned.contains(category))
            })
            .unwrap_or(FALLBACK_CATEGORY);
        assigned.insert(chosen);
        mapping.insert(cluster, chosen.to_string());
    }

    mapping
}

/// 小文字化・空白分割した単語を頻度順に `top_n` 個返す。同数は初出順。
#[must_use]
pub fn top_words<'a>(texts: impl IntoIterator<Item = &'a str>, top_n: usize) -> Vec<String> {
    let mut counts: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    let mut position = 0_usize;
    for text in texts {
        for word in text.to_lowercase().split_whitespace() {
            counts
                .entry(word.to_string())
                .or_insert((0, position))
                .0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
        count_b.cmp(count_a).then(first_a.cmp(first_b))
    });
    ranked
        .into_iter()
        .take(top_n)
        .map(|(word, _)| word)
        .collect()
}

/// `(グループ, テキスト)` の並びをグループごとに集計する。グループは初出順。
#[must_use]
pub fn top_words_by_group<'a>(
    rows: impl IntoIterator<Item = (&'a str, &'a str)>,
    top_n: usize,
) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for (group, text) in rows {
        grouped
            .entry(group)
            .or_insert_with(|| {
                order.push(group);
                Vec::new()
            })
            .push(text);
    }
    order
        .into_iter()
        .map(|group| {
            let texts = grouped.remove(group).unwrap_or_default();
            (group.to_string(), top_words(texts, top_n))
        })
        .collect()
}
