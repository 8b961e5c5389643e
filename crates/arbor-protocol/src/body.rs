//! Text bodies: hash lists, existence answers and root-update queries.

use arbor_types::Hash;
use url::form_urlencoded;

use crate::endpoint::params;
use crate::error::{ProtocolError, ProtocolResult};

fn parse_hash(s: &str) -> ProtocolResult<Hash> {
    Hash::from_hex(s).map_err(|e| ProtocolError::InvalidHash(format!("{s:?}: {e}")))
}

/// Form body for `getRefs`/`hasRefs`: `ref=<hex>&ref=<hex>…`.
pub fn encode_hash_list(hashes: &[Hash]) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());
    for h in hashes {
        form.append_pair(params::REF, &h.to_hex());
    }
    form.finish()
}

/// Parse a hash-list form body. Parameters other than `ref` are ignored.
pub fn parse_hash_list(body: &[u8]) -> ProtocolResult<Vec<Hash>> {
    form_urlencoded::parse(body)
        .filter(|(k, _)| k == params::REF)
        .map(|(_, v)| parse_hash(&v))
        .collect()
}

/// `hasRefs` response: one `<hex> <true|false>` line per hash.
pub fn encode_has_response(answers: &[(Hash, bool)]) -> String {
    answers
        .iter()
        .map(|(h, present)| format!("{} {}\n", h.to_hex(), present))
        .collect()
}

pub fn parse_has_response(body: &str) -> ProtocolResult<Vec<(Hash, bool)>> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| -> ProtocolResult<(Hash, bool)> {
            let (hex, flag) = line
                .split_once(' ')
                .ok_or_else(|| ProtocolError::MalformedBody(format!("bad has line: {line:?}")))?;
            let present = match flag.trim() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(ProtocolError::MalformedBody(format!("bad has flag: {other:?}")));
                }
            };
            Ok((parse_hash(hex)?, present))
        })
        .collect()
}

/// Newline-separated hashes, as sent in a backpressure response.
pub fn encode_hash_lines(hashes: &[Hash]) -> String {
    hashes.iter().map(|h| format!("{}\n", h.to_hex())).collect()
}

pub fn parse_hash_lines(body: &str) -> ProtocolResult<Vec<Hash>> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(parse_hash)
        .collect()
}

/// Query string for `POST /root/`.
pub fn root_update_query(last: &Hash, current: &Hash) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair(params::LAST, &last.to_hex())
        .append_pair(params::CURRENT, &current.to_hex())
        .finish()
}

/// The `(last, current)` pair of a root-update query.
pub fn parse_root_update(query: &str) -> ProtocolResult<(Hash, Hash)> {
    let mut last = None;
    let mut current = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        if k == params::LAST {
            last = Some(parse_hash(&v)?);
        } else if k == params::CURRENT {
            current = Some(parse_hash(&v)?);
        }
    }
    match (last, current) {
        (Some(last), Some(current)) => Ok((last, current)),
        _ => Err(ProtocolError::MalformedBody(
            "root update needs both `last` and `current`".into(),
        )),
    }
}

/// The hash named by a `getBlob` query, if present.
pub fn parse_blob_query(query: &str) -> ProtocolResult<Option<Hash>> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == params::HASH)
        .map(|(_, v)| parse_hash(&v))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_list_roundtrip() {
        let hashes = vec![Hash::of(b"a"), Hash::of(b"b"), Hash::of(b"a")];
        let body = encode_hash_list(&hashes);
        assert!(body.starts_with("ref="));
        assert_eq!(parse_hash_list(body.as_bytes()).unwrap(), hashes);
    }

    #[test]
    fn hash_list_ignores_other_params_and_rejects_bad_hex() {
        let body = format!("x=1&ref={}", Hash::of(b"a").to_hex());
        assert_eq!(parse_hash_list(body.as_bytes()).unwrap(), vec![Hash::of(b"a")]);
        assert!(matches!(parse_hash_list(b"ref=zz"), Err(ProtocolError::InvalidHash(_))));
    }

    #[test]
    fn has_response_lines() {
        let answers = vec![(Hash::of(b"a"), true), (Hash::of(b"b"), false)];
        let body = encode_has_response(&answers);
        assert_eq!(body.lines().count(), 2);
        assert!(body.lines().next().unwrap().ends_with(" true"));
        assert_eq!(parse_has_response(&body).unwrap(), answers);
        assert!(parse_has_response("abc maybe").is_err());
    }

    #[test]
    fn hash_lines_roundtrip() {
        let hashes = vec![Hash::of(b"x"), Hash::of(b"y")];
        assert_eq!(parse_hash_lines(&encode_hash_lines(&hashes)).unwrap(), hashes);
        assert!(parse_hash_lines("").unwrap().is_empty());
    }

    #[test]
    fn root_update_query_parses() {
        let (last, current) = (Hash::empty(), Hash::of(b"new"));
        let q = root_update_query(&last, &current);
        assert_eq!(parse_root_update(&q).unwrap(), (last, current));
        assert!(parse_root_update("last=00").is_err());
        assert!(parse_root_update(&format!("last={}", last.to_hex())).is_err());
    }

    #[test]
    fn blob_query() {
        let h = Hash::of(b"blob");
        assert_eq!(parse_blob_query(&format!("h={}", h.to_hex())).unwrap(), Some(h));
        assert_eq!(parse_blob_query("").unwrap(), None);
        assert!(parse_blob_query("h=nothex").is_err());
    }
}
