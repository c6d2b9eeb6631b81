// MIT License - Copyright (c) 2026 Peter Wright

use std::collections::HashMap;

/// Column letters of the challenge card, in grid order.
const COLUMNS: [char; 6] = ['A', 'B', 'C', 'D', 'E', 'F'];

/// Check the shape of a login challenge token: one letter A-F followed by
/// one digit 1-5. The dialect prober relies on this to tell a real login
/// page from an unrelated page that happens to match the selector.
pub fn is_login_challenge(text: &str) -> bool {
    let mut chars = text.chars();
    let (Some(letter), Some(digit), None) = (chars.next(), chars.next(), chars.next()) else {
        return false;
    };
    ('A'..='F').contains(&letter) && ('1'..='5').contains(&digit)
}

/// Build the challenge-key -> code table from the card's cells.
///
/// The card is a 6-column grid read in row-major order: column = index mod 6,
/// rows numbered from 1. Cell texts are taken as-is (the codes are numeric
/// strings, but the panel owns that format).
pub fn decode_challenge_card<I, S>(cells: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut codes = HashMap::new();
    let mut row = 0usize;
    for (index, cell) in cells.into_iter().enumerate() {
        let column = index % 6;
        if column == 0 {
            row += 1;
        }
        codes.insert(
            format!("{}{}", COLUMNS[column], row),
            cell.as_ref().trim().to_string(),
        );
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_cells(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{:04}", 1000 + i)).collect()
    }

    #[test]
    fn test_login_challenge_shape() {
        assert!(is_login_challenge("A1"));
        assert!(is_login_challenge("F5"));
        assert!(!is_login_challenge("G1"));
        assert!(!is_login_challenge("A6"));
        assert!(!is_login_challenge("A0"));
        assert!(!is_login_challenge("a1"));
        assert!(!is_login_challenge("A12"));
        assert!(!is_login_challenge("A"));
        assert!(!is_login_challenge(""));
        assert!(!is_login_challenge("Erreur"));
    }

    #[test]
    fn test_card_rows_and_keys() {
        // 30 cells -> 5 full rows, keys A1..F5, all unique.
        let codes = decode_challenge_card(card_cells(30));
        assert_eq!(codes.len(), 30);
        assert_eq!(codes.get("A1").map(String::as_str), Some("1000"));
        assert_eq!(codes.get("F1").map(String::as_str), Some("1005"));
        assert_eq!(codes.get("A2").map(String::as_str), Some("1006"));
        assert_eq!(codes.get("F5").map(String::as_str), Some("1029"));
    }

    #[test]
    fn test_card_partial_last_row() {
        // 8 cells -> ceil(8/6) = 2 rows, second row has only A2 and B2.
        let codes = decode_challenge_card(card_cells(8));
        assert_eq!(codes.len(), 8);
        assert_eq!(codes.get("B2").map(String::as_str), Some("1007"));
        assert!(codes.get("C2").is_none());
    }

    #[test]
    fn test_card_decode_is_stable() {
        let cells = card_cells(36);
        assert_eq!(
            decode_challenge_card(cells.iter()),
            decode_challenge_card(cells.iter())
        );
    }

    #[test]
    fn test_card_cell_whitespace_trimmed() {
        let codes = decode_challenge_card(["  4821 "]);
        assert_eq!(codes.get("A1").map(String::as_str), Some("4821"));
    }
}
