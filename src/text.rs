//! String Primitives
//!
//! Normalization, phonetic encoding, edit distance, and the OCR homoglyph
//! fold shared by the matchers and the service layer.

use std::collections::HashSet;

/// Lowercase and trim a raw token or phrase.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Fold OCR homoglyphs into their letter forms and collapse whitespace runs.
///
/// Scanned clinical documents routinely render `o` as `0`, `l` as `1` or `|`,
/// `s` as `5` or `$`, and so on. The fold is lossy on purpose: it maps noisy
/// tokens onto the space the gazetteer lives in.
pub fn fold_ocr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;

    for ch in input.chars() {
        let mapped = match ch {
            '0' => 'o',
            '1' | '|' => 'l',
            '!' => 'i',
            '@' => 'a',
            '$' => 's',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '6' => 'g',
            '7' => 't',
            '8' => 'b',
            '9' => 'g',
            _ => ch,
        };

        let lower = mapped.to_ascii_lowercase();
        if lower.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        out.push(lower);
    }

    out.trim().to_string()
}

/// Collapse runs of the same character: `"wiilliam"` becomes `"wiliam"`.
///
/// OCR doubles strokes often enough that a run-collapsed retry recovers
/// names the plain fold misses.
pub fn collapse_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev: Option<char> = None;
    for ch in input.chars() {
        if prev != Some(ch) {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out
}

/// Soundex phonetic encoding, 4-character code.
pub fn soundex(text: &str) -> String {
    let s: String = text
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();

    if s.is_empty() {
        return "0000".to_string();
    }

    let code = |c: char| -> char {
        match c {
            'B' | 'F' | 'P' | 'V' => '1',
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => '2',
            'D' | 'T' => '3',
            'L' => '4',
            'M' | 'N' => '5',
            'R' => '6',
            _ => '0',
        }
    };

    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(4);
    result.push(chars[0]);

    let mut prev_code = code(chars[0]);
    for &c in chars.iter().skip(1) {
        if result.len() >= 4 {
            break;
        }
        let curr_code = code(c);
        if curr_code != '0' && curr_code != prev_code {
            result.push(curr_code);
        }
        prev_code = curr_code;
    }

    while result.len() < 4 {
        result.push('0');
    }

    result
}

/// Damerau-Levenshtein distance with unit-cost adjacent transpositions.
///
/// Rejects early on length delta beyond `bound`, returning a value larger
/// than `bound` without running the dynamic program.
pub fn damerau_levenshtein(a: &str, b: &str, bound: usize) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let len_a = a_chars.len();
    let len_b = b_chars.len();

    if len_a == 0 {
        return len_b;
    }
    if len_b == 0 {
        return len_a;
    }

    let diff = len_a.abs_diff(len_b);
    if diff > bound {
        return diff;
    }

    // Three rolling rows; the row two back serves the transposition case.
    let mut prev_prev = vec![0usize; len_b + 1];
    let mut prev: Vec<usize> = (0..=len_b).collect();
    let mut curr = vec![0usize; len_b + 1];

    for i in 1..=len_a {
        curr[0] = i;

        for j in 1..=len_b {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);

            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);

            if i > 1
                && j > 1
                && a_chars[i - 1] == b_chars[j - 2]
                && a_chars[i - 2] == b_chars[j - 1]
            {
                curr[j] = curr[j].min(prev_prev[j - 2] + cost);
            }
        }

        std::mem::swap(&mut prev_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[len_b]
}

/// Confidence model shared by every fuzzy path.
///
/// Distance 0 is a certainty. Otherwise the score starts from length-relative
/// similarity, earns a bonus for a shared prefix (names are misread in the
/// middle far more often than at the start), and decays per edit.
pub fn match_confidence(query: &str, matched: &str, distance: usize) -> f64 {
    if distance == 0 {
        return 1.0;
    }

    let max_len = query.chars().count().max(matched.chars().count()) as f64;
    let similarity = 1.0 - (distance as f64 / max_len);

    let prefix_len = query
        .chars()
        .zip(matched.chars())
        .take(4)
        .take_while(|(a, b)| a == b)
        .count();

    let prefix_bonus = prefix_len as f64 * 0.1 * (1.0 - similarity);
    let confidence = (similarity + prefix_bonus).min(0.99);

    confidence * 0.92_f64.powi(distance as i32)
}

/// A deletion variant of a term and how many characters were removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionVariant {
    pub text: String,
    pub distance: usize,
}

/// Every string reachable from `term` by deleting up to `max_distance`
/// characters, deduplicated, never shorter than `min_len`.
pub fn deletion_variants(term: &str, max_distance: usize, min_len: usize) -> Vec<DeletionVariant> {
    let mut result = Vec::new();
    if max_distance == 0 {
        return result;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut queue = vec![DeletionVariant {
        text: term.to_string(),
        distance: 0,
    }];

    let min_len = min_len.saturating_sub(max_distance).max(1);

    while let Some(current) = queue.pop() {
        if current.distance > 0 {
            result.push(current.clone());
        }

        if current.distance >= max_distance {
            continue;
        }

        let chars: Vec<char> = current.text.chars().collect();
        for i in 0..chars.len() {
            let deletion: String = chars[..i].iter().chain(chars[i + 1..].iter()).collect();

            if deletion.chars().count() >= min_len && !seen.contains(&deletion) {
                seen.insert(deletion.clone());
                queue.push(DeletionVariant {
                    text: deletion,
                    distance: current.distance + 1,
                });
            }
        }
    }

    result
}
