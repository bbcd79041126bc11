pub mod agglomerative;
pub mod text;
