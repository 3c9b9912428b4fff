//! Key/value sources of the first bind pass: query strings, urlencoded bodies and the text
//! fields of `multipart/form-data` bodies.

use crate::error::BindError;
use std::collections::BTreeMap;

/// Repeated keys keep every value in arrival order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct FormValues {
    values: BTreeMap<String, Vec<String>>,
}

impl FormValues {
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            form.values.entry(key).or_default().push(value);
        }
        form
    }

    pub(crate) fn from_query(query: Option<&str>) -> Result<Self, BindError> {
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query.unwrap_or_default())
            .map_err(BindError::Query)?;
        Ok(Self::from_pairs(pairs))
    }

    pub(crate) fn from_urlencoded(body: &[u8]) -> Result<Self, BindError> {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body).map_err(BindError::Form)?;
        Ok(Self::from_pairs(pairs))
    }

    /// Append the values of `other` after the values already present.
    pub(crate) fn extend(&mut self, other: FormValues) {
        for (key, values) in other.values {
            self.values.entry(key).or_default().extend(values);
        }
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Vec<String>)> {
        self.values.into_iter()
    }
}

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Collect the text fields of a `multipart/form-data` body, file parts are skipped.
pub(crate) fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormValues, BindError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut pos = find(body, delimiter, 0).ok_or_else(|| BindError::multipart("missing boundary"))?;
    let mut pairs = vec![];

    loop {
        let start = pos + delimiter.len();
        let rest = &body[start..];
        if rest.starts_with(b"--") {
            break;
        }

        let next = find(body, delimiter, start).ok_or_else(|| BindError::multipart("missing closing boundary"))?;
        let part = strip_crlf(&body[start..next]);
        if let Some((name, value)) = parse_part(part)? {
            pairs.push((name, value));
        }
        pos = next;
    }

    Ok(FormValues::from_pairs(pairs))
}

fn parse_part(part: &[u8]) -> Result<Option<(String, String)>, BindError> {
    let header_end = find(part, HEADER_END, 0).ok_or_else(|| BindError::multipart("part without header"))?;
    let headers =
        std::str::from_utf8(&part[..header_end]).map_err(|_| BindError::multipart("part header is not utf-8"))?;
    let content = &part[header_end + HEADER_END.len()..];

    let Some(disposition) = headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-disposition"))
        .map(|(_, value)| value)
    else {
        return Ok(None);
    };

    if header_param(disposition, "filename").is_some() {
        return Ok(None);
    }

    let Some(name) = header_param(disposition, "name") else {
        return Ok(None);
    };

    let value = String::from_utf8(content.to_vec())
        .map_err(|_| BindError::multipart(format!("value of field `{name}` is not utf-8")))?;
    Ok(Some((name, value)))
}

/// Extract `param` from a header value like `form-data; name="title"`.
fn header_param(header: &str, param: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|item| {
        let (key, value) = item.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case(param) {
            return None;
        }
        let value = value.trim();
        Some(value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value).to_string())
    })
}

fn strip_crlf(part: &[u8]) -> &[u8] {
    let part = part.strip_prefix(CRLF).unwrap_or(part);
    part.strip_suffix(CRLF).unwrap_or(part)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
