//! RFC 5988 Link header parsing for fragment asset hints
//!
//! Upstream fragment responses announce their stylesheets and client-side
//! script through `Link` (or `X-AMZ-Meta-Link`) headers. Only two relation
//! types matter here: every `rel="stylesheet"` URL is collected in header
//! order, and the first `rel="fragment-script"` URL is kept.

use http::HeaderMap;

/// Asset references extracted from one upstream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetLinks {
    /// Stylesheet URLs in the order they were announced
    pub stylesheets: Vec<String>,
    /// URL of the fragment's client-side script, when announced
    pub fragment_script: Option<String>,
}

impl AssetLinks {
    /// Extract asset links from a response header map
    ///
    /// Both `Link` and `X-AMZ-Meta-Link` are honored, case-insensitively;
    /// values that fail to parse are skipped rather than failing the
    /// fragment.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut links = AssetLinks::default();
        for header_name in ["link", "x-amz-meta-link"] {
            for value in headers.get_all(header_name) {
                if let Ok(value) = value.to_str() {
                    links.extend_from_value(value);
                }
            }
        }
        links
    }

    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.fragment_script.is_none()
    }

    fn extend_from_value(&mut self, value: &str) {
        for entry in split_link_list(value) {
            let Some((uri, rel)) = parse_link_entry(entry) else {
                continue;
            };
            // rel is a whitespace-separated list of relation types.
            for relation in rel.split_ascii_whitespace() {
                if relation.eq_ignore_ascii_case("stylesheet") {
                    self.stylesheets.push(uri.to_string());
                } else if relation.eq_ignore_ascii_case("fragment-script")
                    && self.fragment_script.is_none()
                {
                    self.fragment_script = Some(uri.to_string());
                }
            }
        }
    }
}

/// Split a Link header value on top-level commas
///
/// Commas inside `<...>` URI references or quoted parameter values do not
/// separate entries.
fn split_link_list(value: &str) -> Vec<&str> {
    let bytes = value.as_bytes();
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_angle = false;
    let mut in_quote = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' if !in_quote => in_angle = true,
            b'>' if !in_quote => in_angle = false,
            b'"' if !in_angle => in_quote = !in_quote,
            b',' if !in_angle && !in_quote => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// Parse one `<uri>; param=value; ...` entry into its URI and rel value
fn parse_link_entry(entry: &str) -> Option<(&str, &str)> {
    let entry = entry.trim();
    let rest = entry.strip_prefix('<')?;
    let close = rest.find('>')?;
    let uri = &rest[..close];
    if uri.is_empty() {
        return None;
    }

    let mut rel = None;
    for param in rest[close + 1..].split(';') {
        let param = param.trim();
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("rel") {
            let value = value.trim().trim_matches('"');
            rel = Some(value);
            // Per RFC 5988 the first rel parameter wins.
            break;
        }
    }
    rel.map(|rel| (uri, rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_stylesheet_and_script() {
        let headers = header_map(&[(
            "link",
            r#"<http://link>; rel="stylesheet",<http://link2>; rel="fragment-script""#,
        )]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(links.stylesheets, vec!["http://link".to_string()]);
        assert_eq!(links.fragment_script.as_deref(), Some("http://link2"));
    }

    #[test]
    fn test_multiple_stylesheets_keep_order() {
        let headers = header_map(&[(
            "link",
            r#"<http://a.css>; rel="stylesheet", <http://b.css>; rel="stylesheet""#,
        )]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(
            links.stylesheets,
            vec!["http://a.css".to_string(), "http://b.css".to_string()]
        );
    }

    #[test]
    fn test_first_fragment_script_wins() {
        let headers = header_map(&[(
            "link",
            r#"<http://one.js>; rel="fragment-script", <http://two.js>; rel="fragment-script""#,
        )]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(links.fragment_script.as_deref(), Some("http://one.js"));
    }

    #[test]
    fn test_amz_meta_link_header() {
        let headers = header_map(&[("x-amz-meta-link", r#"<http://s3.css>; rel="stylesheet""#)]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(links.stylesheets, vec!["http://s3.css".to_string()]);
    }

    #[test]
    fn test_unquoted_rel_and_case() {
        let headers = header_map(&[("link", "<http://x.css>; REL=Stylesheet")]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(links.stylesheets, vec!["http://x.css".to_string()]);
    }

    #[test]
    fn test_unrelated_relations_ignored() {
        let headers = header_map(&[(
            "link",
            r#"<http://next>; rel="next", <http://pre>; rel="preload""#,
        )]);
        let links = AssetLinks::from_headers(&headers);
        assert!(links.is_empty());
    }

    #[test]
    fn test_comma_inside_uri() {
        let headers = header_map(&[(
            "link",
            r#"<http://x/a,b.css>; rel="stylesheet", <http://y.css>; rel="stylesheet""#,
        )]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(
            links.stylesheets,
            vec!["http://x/a,b.css".to_string(), "http://y.css".to_string()]
        );
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let headers = header_map(&[("link", r#"garbage, <>; rel="stylesheet", <http://ok.css>; rel="stylesheet""#)]);
        let links = AssetLinks::from_headers(&headers);
        assert_eq!(links.stylesheets, vec!["http://ok.css".to_string()]);
    }

    #[test]
    fn test_no_headers() {
        let links = AssetLinks::from_headers(&HeaderMap::new());
        assert!(links.is_empty());
    }
}
