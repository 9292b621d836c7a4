//! Heuristic quality score for recognized text

/// Characters that OCR engines typically emit for noise
const NOISE_CHARS: &[char] = &['?', '#', '~', '|', '{', '}', '[', ']'];

/// Scores recognized text in [0, 100]
///
/// More tokens and longer tokens raise the score; noise characters lower it.
/// Empty or whitespace-only text scores 0.
pub fn score_confidence(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let count = tokens.len() as f64;
    let base = (40.0 + 30.0 * count.max(1.0).log10()).min(100.0);

    let total_chars: usize = tokens.iter().map(|t| t.chars().count()).sum();
    let avg_len = total_chars as f64 / count;
    let length_bonus = ((avg_len - 3.0) * 5.0).clamp(0.0, 20.0);

    let noise = tokens
        .iter()
        .flat_map(|t| t.chars())
        .filter(|c| NOISE_CHARS.contains(c))
        .count();
    let noise_penalty = noise as f64 / total_chars as f64 * 100.0;

    (base + length_bonus - noise_penalty).clamp(0.0, 100.0)
}
