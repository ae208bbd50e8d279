//! Text sanitizers for the textual output channel and tracebacks.

use once_cell::sync::Lazy;
use regex::Regex;

/// HTML elements that rich reprs emit. Anything else in angle brackets, such
/// as `<class 'int'>` or `Vec<u8>`, is left alone.
const HTML_ELEMENTS: &str = "a|abbr|b|blockquote|body|br|caption|code|col|colgroup|dd|details|div|dl|dt|em|\
    font|h[1-6]|head|hr|html|i|img|kbd|li|link|meta|ol|p|pre|s|samp|script|small|span|strong|style|\
    sub|summary|sup|svg|table|tbody|td|tfoot|th|thead|title|tr|tt|u|ul";

static TAG: Lazy<Regex> = Lazy::new(|| {
    let attr = r#"[A-Za-z_:][-A-Za-z0-9_:.]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?"#;
    Regex::new(&format!(
        r"(?s)<!--.*?-->|(?i:</?(?:{HTML_ELEMENTS})(?:\s+{attr})*\s*/?>)"
    ))
    .unwrap()
});
static PRESENTATION_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s*\b(?:style|class)\s*=\s*(?:"[^"]*"|'[^']*')"#).unwrap());
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());

/// Remove markup that leaked from rich rendering: whole tags first, then
/// dangling `style=`/`class=` fragments that were not inside a tag.
pub fn strip_markup(text: &str) -> String {
    let without_tags = TAG.replace_all(text, "");
    PRESENTATION_ATTR.replace_all(&without_tags, "").into_owned()
}

/// Remove terminal colour escapes (IPython tracebacks are coloured).
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_attributes() {
        assert_eq!(strip_markup("<div class=\"x\">a<br/>b</div>"), "ab");
        assert_eq!(strip_markup("value style=\"color: red\" end"), "value end");
        assert_eq!(strip_markup("class='df' 3 rows"), " 3 rows");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(strip_markup("1 < 2 and 3 > 2\n"), "1 < 2 and 3 > 2\n");
        assert_eq!(strip_markup("x = 5\n"), "x = 5\n");
    }

    #[test]
    fn keeps_angle_bracketed_reprs() {
        let text = "<class 'int'>\n<function f at 0x7f00>\n[<matplotlib.lines.Line2D object at 0x7f01>]\nVec<u8>\nList<String>\n";
        assert_eq!(strip_markup(text), text);
        assert_eq!(strip_markup("<B>bold</B> <p align=center>x</p>"), "bold x");
    }

    #[test]
    fn strips_ansi_colours() {
        let tb = "\u{1b}[0;31mValueError\u{1b}[0m: bad";
        assert_eq!(strip_ansi(tb), "ValueError: bad");
    }
}
