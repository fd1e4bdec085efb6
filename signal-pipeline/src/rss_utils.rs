/// Text and URL helpers shared by the feed parser, corpus builder and formatter

/// Text cleanup for feed content
pub mod text {
    /// Remove markup tags, decode entities and collapse whitespace.
    pub fn clean_feed_text(raw: &str) -> String {
        collapse_whitespace(&decode_entities(&strip_html(raw)))
    }

    /// Drop everything between `<` and `>`. Tags are replaced by a space so
    /// adjacent block elements don't glue words together.
    pub fn strip_html(html: &str) -> String {
        html.chars()
            .fold((String::with_capacity(html.len()), false), |(mut text, in_tag), c| {
                match c {
                    '<' => (text, true),
                    '>' if in_tag => {
                        text.push(' ');
                        (text, false)
                    }
                    _ if !in_tag => {
                        text.push(c);
                        (text, in_tag)
                    }
                    _ => (text, in_tag),
                }
            })
            .0
    }

    /// Decode the named entities feeds actually use plus numeric references.
    /// Unknown entities are left as-is.
    pub fn decode_entities(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let candidate = &rest[amp..];
            let decoded = candidate
                .find(';')
                .filter(|&end| end <= 10)
                .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));

            match decoded {
                Some((c, end)) => {
                    out.push(c);
                    rest = &candidate[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn decode_entity(name: &str) -> Option<char> {
        match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "ndash" => Some('–'),
            "mdash" => Some('—'),
            "hellip" => Some('…'),
            "lsquo" => Some('‘'),
            "rsquo" => Some('’'),
            "ldquo" => Some('“'),
            "rdquo" => Some('”'),
            _ => {
                let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()?
                } else {
                    name.strip_prefix('#')?.parse().ok()?
                };
                char::from_u32(code)
            }
        }
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Key used for duplicate detection: case-folded with whitespace collapsed.
    pub fn normalize_title(title: &str) -> String {
        collapse_whitespace(title).to_lowercase()
    }

    /// First `max_chars` characters of `text`, never splitting a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => &text[..byte_index],
            None => text,
        }
    }
}

/// URL utilities for feed sources
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str).ok()?.domain().map(|d| d.to_string())
    }

    /// Feeds are only fetched over http(s).
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }
}
