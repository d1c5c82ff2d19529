//! Minimal pattern-based extraction from raw markup.
//!
//! The reservation pages are not well-formed enough to trust a DOM parser, so
//! everything here works on the text with a handful of regexes. Nothing in this
//! module fails: when a pattern does not match the result is simply empty.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FORM_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<form\b[^>]*>").unwrap());

static INPUT_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<input\b[^>]*>").unwrap());

// name="double" | name='single' | name=bare
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .unwrap()
});

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());

static TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap());

static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap());

static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]\s*>").unwrap());

static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<([a-z][a-z0-9]*)\b([^>]*)>").unwrap());

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap()
});

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<\s*/?\s*([A-Za-z][A-Za-z0-9]*)?[^>]*>").unwrap());

// Tags that separate words when rendered; every other tag is dropped without a gap
const BREAKING_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "tr", "td", "th", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "dd", "dt", "option",
];

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

/// Login form as found on the login page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// `None` means the form posts back to the page it came from
    pub action_url: Option<String>,
    pub hidden_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

pub type Row = Vec<String>;
pub type Table = Vec<Row>;

/// Action of the first `<form>` that carries one
pub fn extract_form_action(html: &str) -> Option<String> {
    FORM_TAG_RE
        .find_iter(html)
        .find_map(|m| parse_attributes(m.as_str()).remove("action"))
        .map(|action| action.trim().to_string())
        .filter(|action| !action.is_empty())
}

/// Every `<input type="hidden">` with a name; the last occurrence of a name wins
pub fn extract_hidden_fields(html: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for m in INPUT_TAG_RE.find_iter(html) {
        let mut attrs = parse_attributes(m.as_str());
        let is_hidden = attrs
            .get("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"));
        if !is_hidden {
            continue;
        }
        let Some(name) = attrs.remove("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        let value = attrs.remove("value").unwrap_or_default();
        fields.insert(name, value);
    }
    fields
}

pub fn extract_login_form(html: &str) -> LoginForm {
    LoginForm {
        action_url: extract_form_action(html),
        hidden_fields: extract_hidden_fields(html),
    }
}

/// Anchors with an `href` whose visible text satisfies `predicate`, in document order
pub fn extract_links<F>(html: &str, predicate: F) -> Vec<Link>
where
    F: Fn(&str) -> bool,
{
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let href = parse_attributes(&caps[1]).remove("href")?;
            let href = href.trim().to_string();
            if href.is_empty() {
                return None;
            }
            let text = text_content(&caps[2]);
            predicate(&text).then_some(Link { href, text })
        })
        .collect()
}

/// Table -> row -> cell text. Both `<td>` and `<th>` count as cells.
pub fn extract_tables(html: &str) -> Vec<Table> {
    let html = strip_noise(html);
    TABLE_RE
        .captures_iter(&html)
        .map(|table| {
            ROW_RE
                .captures_iter(&table[1])
                .map(|row| {
                    CELL_RE
                        .captures_iter(&row[1])
                        .map(|cell| text_content(&cell[1]))
                        .collect::<Row>()
                })
                .collect::<Table>()
        })
        .collect()
}

/// Text of the first element whose class mentions "error"
pub fn extract_error_message(html: &str) -> Option<String> {
    let html = strip_noise(html);
    for caps in OPEN_TAG_RE.captures_iter(&html) {
        let has_error_class = parse_attributes(&caps[2])
            .get("class")
            .is_some_and(|class| class.to_lowercase().contains("error"));
        if !has_error_class {
            continue;
        }

        let tag = caps[1].to_lowercase();
        let Some(whole) = caps.get(0) else { continue };
        let rest = &html[whole.end()..];
        let closing = format!("</{}", tag);
        // ASCII lowercasing keeps byte offsets intact
        let end = rest.to_ascii_lowercase().find(&closing).unwrap_or(rest.len());
        let text = text_content(&rest[..end]);
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

/// Visible text of a fragment: tags stripped, entities decoded, whitespace collapsed
pub fn text_content(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, |caps: &Captures| {
        let breaks = caps
            .get(1)
            .is_some_and(|name| BREAKING_TAGS.contains(&name.as_str().to_ascii_lowercase().as_str()));
        if breaks { " " } else { "" }
    });
    decode_entities(&without_tags)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Attribute map of one tag; names lowercased, values entity-decoded
pub fn parse_attributes(tag: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTR_RE.captures_iter(tag) {
        let name = caps[1].to_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        // First occurrence wins, as in browsers
        attrs.entry(name).or_insert_with(|| decode_entities(value));
    }
    attrs
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn strip_noise(html: &str) -> String {
    let html = COMMENT_RE.replace_all(html, "");
    SCRIPT_RE.replace_all(&html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form name="loginForm" method="post" action="/web/rsvWUserAttestationLoginAction.do">
            <INPUT TYPE="hidden" NAME="token" VALUE="t-1">
            <input value="abc&amp;def" name="org.apache.struts.taglib.html.TOKEN" type='hidden'>
            <input type="hidden" name="token" value="t-2">
            <input type="hidden" name="emptyValue">
            <input type="text" name="userId" value="">
            <input type="password" name="password">
        </form>
        <form action="/web/other.do"></form>
        </body></html>
    "#;

    #[test]
    fn test_extract_form_action_takes_first_form() {
        assert_eq!(
            extract_form_action(LOGIN_PAGE).as_deref(),
            Some("/web/rsvWUserAttestationLoginAction.do")
        );
    }

    #[test]
    fn test_extract_form_action_absent() {
        assert_eq!(extract_form_action("<p>no form here</p>"), None);
        assert_eq!(extract_form_action(r#"<form action="">"#), None);
    }

    #[test]
    fn test_hidden_fields_last_occurrence_wins() {
        let fields = extract_hidden_fields(LOGIN_PAGE);

        assert_eq!(fields.get("token").map(String::as_str), Some("t-2"));
        assert_eq!(
            fields.get("org.apache.struts.taglib.html.TOKEN").map(String::as_str),
            Some("abc&def")
        );
        assert_eq!(fields.get("emptyValue").map(String::as_str), Some(""));
        assert!(!fields.contains_key("userId"));
        assert!(!fields.contains_key("password"));
    }

    #[test]
    fn test_login_form_combines_action_and_fields() {
        let form = extract_login_form(LOGIN_PAGE);
        assert!(form.action_url.is_some());
        assert_eq!(form.hidden_fields.len(), 3);
    }

    #[test]
    fn test_extract_links_filters_by_text() {
        let html = r#"
            <a href="/web/menu.do">メニュー</a>
            <a class="nav" href="/web/tennis.do?a=1&amp;b=2"><span>テニス</span> 空き状況</a>
            <a name="anchor">no href</a>
            <A HREF='/web/logout.do'>ログアウト</A>
        "#;
        let links = extract_links(html, |text| text.contains("テニス"));

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href, "/web/tennis.do?a=1&b=2");
        assert_eq!(links[0].text, "テニス 空き状況");

        let all = extract_links(html, |_| true);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].href, "/web/logout.do");
    }

    #[test]
    fn test_extract_tables_nested_markup() {
        let html = r##"
            <table class="result" border=1>
              <tr><th>施設</th><th>状況</th></tr>
              <tr bgcolor="#fff">
                <td align="left"><a href="#"><b>テニスコート A</b></a></td>
                <td>○&nbsp;空きあり</td>
              </tr>
              <tr><td colspan="2"></td></tr>
            </table>
            <TABLE><TR><TD>x</TD></TR></TABLE>
        "##;
        let tables = extract_tables(html);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][0], vec!["施設", "状況"]);
        assert_eq!(tables[0][1], vec!["テニスコート A", "○ 空きあり"]);
        assert_eq!(tables[0][2], vec![""]);
        assert_eq!(tables[1], vec![vec!["x".to_string()]]);
    }

    #[test]
    fn test_extract_tables_none() {
        assert!(extract_tables("<div>nothing tabular</div>").is_empty());
    }

    #[test]
    fn test_tables_ignore_commented_markup() {
        let html = "<!-- <table><tr><td>old</td></tr></table> --><table><tr><td>new</td></tr></table>";
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][0][0], "new");
    }

    #[test]
    fn test_extract_error_message() {
        let html = r#"
            <div class="header">ようこそ</div>
            <p class="msg ERROR-text"><b>利用者番号</b>またはパスワードが正しくありません</p>
        "#;
        assert_eq!(
            extract_error_message(html).as_deref(),
            Some("利用者番号またはパスワードが正しくありません")
        );
        assert_eq!(extract_error_message("<div class='ok'>fine</div>"), None);
    }

    #[test]
    fn test_error_message_skips_empty_elements() {
        let html = r#"<span class="error"></span><div class="errors">locked</div>"#;
        assert_eq!(extract_error_message(html).as_deref(), Some("locked"));
    }

    #[test]
    fn test_inline_tags_do_not_split_words() {
        assert_eq!(text_content("空<span class=\"hl\">き</span>"), "空き");
        assert_eq!(text_content("<b>Avail</b>able"), "Available");
        assert_eq!(text_content("コートA<br>コートB"), "コートA コートB");
        assert_eq!(text_content("<div>9:00</div><div>11:00</div>"), "9:00 11:00");
        assert_eq!(text_content("<BR/>x"), "x");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a&amp;b &lt;c&gt; &#65;&#x42; &unknown;"), "a&b <c> AB &unknown;");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }
}
