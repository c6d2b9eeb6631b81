// MIT License - Copyright (c) 2026 Peter Wright

//! CSS-selector extraction over the panel's server-rendered HTML.
//!
//! Selectors come from the active dialect descriptor and stay plain strings
//! there; they are compiled here, at the only place that runs them.

use scraper::{ElementRef, Html, Selector};

use crate::error::{ProtexialError, Result};

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ProtexialError::Selector {
        selector: selector.to_string(),
        details: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first element matching `selector`, or `None` if nothing
/// matches.
pub fn first_text(html: &str, selector: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let selector = compile(selector)?;
    Ok(document.select(&selector).next().map(element_text))
}

/// Texts of all elements matching `selector`, in document order.
pub fn all_texts(html: &str, selector: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = compile(selector)?;
    Ok(document.select(&selector).map(element_text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERROR_PAGE: &str = r#"<html><body>
        <div id="infobox"><p>Une erreur est survenue</p><b>(0x0902)</b></div>
        </body></html>"#;

    const CARD_PAGE: &str = r#"<html><body><table>
        <tr><td class="head">A</td><td class="head">B</td></tr>
        <tr><td>1111</td><td>2222</td></tr>
        <tr><td>3333</td><td>4444</td></tr>
        </table></body></html>"#;

    #[test]
    fn test_first_text() {
        assert_eq!(
            first_text(ERROR_PAGE, "#infobox b").unwrap().as_deref(),
            Some("(0x0902)")
        );
        assert_eq!(first_text(ERROR_PAGE, "#missing b").unwrap(), None);
    }

    #[test]
    fn test_all_texts_skips_classed_cells() {
        // The challenge-card selector excludes header cells by class.
        let texts = all_texts(CARD_PAGE, "td:not([class])").unwrap();
        assert_eq!(texts, vec!["1111", "2222", "3333", "4444"]);
    }

    #[test]
    fn test_nested_text_is_flattened() {
        let html = r#"<div id="form_id"><table>
            <tr><td>x</td></tr><tr><td>x</td></tr><tr><td>x</td></tr>
            <tr><td> <b>B2</b> </td><td>rest</td></tr>
            </table></div>"#;
        assert_eq!(
            first_text(html, "#form_id table tr:nth-child(4) td:nth-child(1) b")
                .unwrap()
                .as_deref(),
            Some("B2")
        );
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(
            first_text("<p></p>", "td:::"),
            Err(ProtexialError::Selector { .. })
        ));
    }
}
