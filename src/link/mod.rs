use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

pub const VMESS_PREFIX: &str = "vmess://";
pub const VLESS_PREFIX: &str = "vless://";

/// Characters left alone by JavaScript's `encodeURIComponent`.
const FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

pub fn is_valid_link(link: &str) -> bool {
    scheme_of(link).is_some()
}

fn scheme_of(link: &str) -> Option<&'static str> {
    [VMESS_PREFIX, VLESS_PREFIX]
        .into_iter()
        .find(|prefix| link.starts_with(prefix))
}

/// Cut at the first `#`.
fn strip_fragment(link: &str) -> &str {
    link.split_once('#').map(|(head, _)| head).unwrap_or(link)
}

/// Replace any fragment with the percent-encoded `name`.
pub fn apply_name_to_link(link: &str, name: &str) -> String {
    format!(
        "{}#{}",
        strip_fragment(link),
        utf8_percent_encode(name, FRAGMENT)
    )
}

/// Set `ps` inside a base64 JSON payload, falling back to fragment naming
/// when the payload is not a JSON object.
pub fn update_ps_in_link(link: &str, name: &str) -> String {
    let Some(scheme) = scheme_of(link) else {
        return apply_name_to_link(link, name);
    };
    let payload = strip_fragment(&link[scheme.len()..]);

    let Some(mut config) = decode_payload(payload) else {
        debug!(scheme, "payload is not base64 json, naming via fragment");
        return apply_name_to_link(link, name);
    };
    config.insert("ps".to_string(), Value::String(name.to_string()));

    let json = Value::Object(config).to_string();
    format!("{scheme}{}", general_purpose::STANDARD.encode(json))
}

/// Rename hook used by the repository for every create/update.
pub fn rename_link(link: &str, name: &str) -> String {
    update_ps_in_link(link, name)
}

/// Key used to detect the same endpoint regardless of its display name.
pub fn link_identity(link: &str) -> String {
    if let Some(scheme) = scheme_of(link) {
        let payload = strip_fragment(&link[scheme.len()..]);
        if let Some(mut config) = decode_payload(payload) {
            config.remove("ps");
            return format!("{scheme}{}", Value::Object(config));
        }
    }
    strip_fragment(link).to_string()
}

fn decode_payload(payload: &str) -> Option<JsonMap<String, Value>> {
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let bytes = STANDARD_LENIENT
        .decode(&cleaned)
        .or_else(|_| URL_SAFE_LENIENT.decode(&cleaned))
        .ok()?;
    let text = String::from_utf8(bytes).ok()?;
    match serde_json::from_str::<Value>(&text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
