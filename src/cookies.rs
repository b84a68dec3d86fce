use http::HeaderMap;
use http::header::COOKIE;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

pub fn parse_cookie_header(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for value in headers.get_all(COOKIE) {
        let Ok(text) = value.to_str() else {
            continue;
        };

        for pair in text.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies
                .entry(name.to_string())
                .or_insert_with(|| decode_value(unquote(value.trim())));
        }
    }

    cookies
}

pub fn format_set_cookie(name: &str, value: &str) -> String {
    format!("{name}={value}; Path=/")
}

/// Values that are not valid percent-encoded UTF-8 are kept as sent.
fn decode_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    percent_decode_str(value)
        .decode_utf8()
        .map_or_else(|_| value.to_string(), |decoded| decoded.into_owned())
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}
