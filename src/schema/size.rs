/// Approximate prompt size above which a schema is considered large.
pub const LARGE_SCHEMA_TOKENS: usize = 3000;

/// Counts the prompt tokens of a rendered schema text.
pub type TokenCounter = fn(&str) -> usize;

/// Whitespace-split approximation of a tokenizer.
pub fn whitespace_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn is_large_schema(text: &str, counter: TokenCounter, threshold: usize) -> bool {
    counter(text) > threshold
}
