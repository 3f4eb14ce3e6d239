//! Typed view of a lineage's persisted renewal parameters.

use std::collections::BTreeMap;

use crate::challenge::ChallengeType;
use crate::error::RestoreError;

/// Webroot configuration restored from persisted parameters.
///
/// Modern conf files persist a per-domain mapping; conf files written
/// before the mapping existed carry a single path (or list of paths)
/// shared by every domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebrootSource {
    /// Shared path list (legacy form)
    Paths(Vec<String>),
    /// Per-domain mapping
    Map(BTreeMap<String, String>),
}

/// The validated, restorable subset of a lineage's persisted parameters.
///
/// Parsed from the flat `[renewalparams]` table with per-field validation:
/// a malformed value is a [`RestoreError`] for that lineage, never a
/// silent default. Keys the core does not know about are plugin-namespaced
/// and collected into [`extra`](Self::extra) untouched.
#[derive(Debug, Clone, Default)]
pub struct RenewalParameters {
    pub authenticator: Option<String>,
    pub installer: Option<String>,
    pub pref_challs: Option<Vec<ChallengeType>>,
    pub must_staple: Option<bool>,
    pub allow_subset_of_names: Option<bool>,
    pub reuse_key: Option<bool>,
    pub rsa_key_size: Option<u32>,
    /// `Some(None)` means the persisted literal `"None"`: explicitly no port
    pub http01_port: Option<Option<u16>>,
    pub webroot: Option<WebrootSource>,
    /// Plugin-namespaced keys, passed through without validation
    pub extra: BTreeMap<String, String>,
}

impl RenewalParameters {
    /// Parse and validate a persisted `[renewalparams]` table.
    pub fn from_table(table: &toml::Table) -> Result<Self, RestoreError> {
        let mut params = Self::default();

        for (key, value) in table {
            match key.as_str() {
                "authenticator" => params.authenticator = Some(string_param("authenticator", value)?),
                "installer" => params.installer = Some(string_param("installer", value)?),
                "pref_challs" => params.pref_challs = Some(parse_pref_challs(value)?),
                "must_staple" => params.must_staple = Some(bool_param("must_staple", value)?),
                "allow_subset_of_names" => {
                    params.allow_subset_of_names =
                        Some(bool_param("allow_subset_of_names", value)?);
                }
                "reuse_key" => params.reuse_key = Some(bool_param("reuse_key", value)?),
                "rsa_key_size" => {
                    params.rsa_key_size = Some(int_param("rsa_key_size", value)? as u32);
                }
                "http01_port" => params.http01_port = Some(parse_http01_port(value)?),
                "webroot_map" => {
                    // The mapping form wins over a legacy path if both appear
                    params.webroot = Some(parse_webroot_map(value)?);
                }
                "webroot_path" => {
                    if !matches!(params.webroot, Some(WebrootSource::Map(_))) {
                        params.webroot = parse_webroot_path(value)?;
                    }
                }
                _ => {
                    params.extra.insert(key.clone(), render_opaque(value));
                }
            }
        }

        Ok(params)
    }
}

fn string_param(field: &'static str, value: &toml::Value) -> Result<String, RestoreError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        other => Err(RestoreError::InvalidValue {
            field,
            value: other.to_string(),
        }),
    }
}

/// Persisted booleans are the exact strings `"True"` and `"False"`.
/// Anything else — including `"maybe"`, `"true"`, or a native boolean —
/// fails restoration for this lineage.
fn bool_param(field: &'static str, value: &toml::Value) -> Result<bool, RestoreError> {
    match value {
        toml::Value::String(s) if s == "True" => Ok(true),
        toml::Value::String(s) if s == "False" => Ok(false),
        other => Err(RestoreError::InvalidBool {
            field,
            value: render_opaque(other),
        }),
    }
}

fn int_param(field: &'static str, value: &toml::Value) -> Result<u64, RestoreError> {
    match value {
        toml::Value::String(s) => s.trim().parse::<u64>().map_err(|_| RestoreError::InvalidInt {
            field,
            value: s.clone(),
        }),
        toml::Value::Integer(i) if *i >= 0 => Ok(*i as u64),
        other => Err(RestoreError::InvalidInt {
            field,
            value: render_opaque(other),
        }),
    }
}

/// `http01_port` is an integer-as-string, or the literal `"None"` for an
/// explicitly absent port.
fn parse_http01_port(value: &toml::Value) -> Result<Option<u16>, RestoreError> {
    if let toml::Value::String(s) = value {
        if s == "None" {
            return Ok(None);
        }
    }
    let port = int_param("http01_port", value)?;
    u16::try_from(port)
        .map(Some)
        .map_err(|_| RestoreError::InvalidInt {
            field: "http01_port",
            value: port.to_string(),
        })
}

/// Preferred challenges persist as a list of names or a single
/// (possibly comma-separated) string. The result is always an ordered
/// list, even for one value.
fn parse_pref_challs(value: &toml::Value) -> Result<Vec<ChallengeType>, RestoreError> {
    match value {
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(name) => ChallengeType::from_name(name),
                other => Err(RestoreError::UnknownChallenge(render_opaque(other))),
            })
            .collect(),
        toml::Value::String(s) => s.split(',').map(ChallengeType::from_name).collect(),
        other => Err(RestoreError::InvalidValue {
            field: "pref_challs",
            value: render_opaque(other),
        }),
    }
}

fn parse_webroot_map(value: &toml::Value) -> Result<WebrootSource, RestoreError> {
    let table = value
        .as_table()
        .ok_or_else(|| RestoreError::InvalidWebroot(format!("webroot_map is not a mapping: {value}")))?;

    let mut map = BTreeMap::new();
    for (domain, path) in table {
        let path = path.as_str().ok_or_else(|| {
            RestoreError::InvalidWebroot(format!("webroot for {domain} is not a path: {path}"))
        })?;
        map.insert(domain.clone(), path.to_string());
    }
    Ok(WebrootSource::Map(map))
}

/// Conf files written before the mapping existed persist `webroot_path`
/// as a bare string; the literal `"None"` means no webroot was configured.
fn parse_webroot_path(value: &toml::Value) -> Result<Option<WebrootSource>, RestoreError> {
    match value {
        toml::Value::String(s) if s == "None" => Ok(None),
        toml::Value::String(s) => Ok(Some(WebrootSource::Paths(vec![s.clone()]))),
        toml::Value::Array(items) => {
            let paths = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        RestoreError::InvalidWebroot(format!("webroot_path entry is not a path: {item}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(WebrootSource::Paths(paths)))
        }
        other => Err(RestoreError::InvalidWebroot(format!(
            "webroot_path is neither a path nor a list: {other}"
        ))),
    }
}

fn render_opaque(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(conf: &str) -> toml::Table {
        conf.parse().unwrap()
    }

    #[test]
    fn test_bool_true_false() {
        let params =
            RenewalParameters::from_table(&table("must_staple = \"True\"\nreuse_key = \"False\""))
                .unwrap();
        assert_eq!(params.must_staple, Some(true));
        assert_eq!(params.reuse_key, Some(false));
    }

    #[test]
    fn test_bool_rejects_noncanonical_strings() {
        for bad in ["maybe", "true", "TRUE", "1", ""] {
            let conf = format!("allow_subset_of_names = {bad:?}");
            let err = RenewalParameters::from_table(&table(&conf)).unwrap_err();
            assert!(
                matches!(err, RestoreError::InvalidBool { field: "allow_subset_of_names", .. }),
                "value {bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_bool_rejects_native_boolean() {
        let err = RenewalParameters::from_table(&table("must_staple = true")).unwrap_err();
        assert!(matches!(err, RestoreError::InvalidBool { .. }));
    }

    #[test]
    fn test_rsa_key_size_parses() {
        let params = RenewalParameters::from_table(&table("rsa_key_size = \"4096\"")).unwrap();
        assert_eq!(params.rsa_key_size, Some(4096));
    }

    #[test]
    fn test_rsa_key_size_rejects_garbage() {
        let err =
            RenewalParameters::from_table(&table("rsa_key_size = \"over 9000\"")).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::InvalidInt { field: "rsa_key_size", .. }
        ));
    }

    #[test]
    fn test_http01_port_none_literal() {
        let params = RenewalParameters::from_table(&table("http01_port = \"None\"")).unwrap();
        assert_eq!(params.http01_port, Some(None));
    }

    #[test]
    fn test_http01_port_number() {
        let params = RenewalParameters::from_table(&table("http01_port = \"8080\"")).unwrap();
        assert_eq!(params.http01_port, Some(Some(8080)));
    }

    #[test]
    fn test_http01_port_rejects_garbage() {
        let err = RenewalParameters::from_table(&table("http01_port = \"eighty\"")).unwrap_err();
        assert!(matches!(err, RestoreError::InvalidInt { .. }));
    }

    #[test]
    fn test_pref_challs_list_and_string_agree() {
        let from_list =
            RenewalParameters::from_table(&table("pref_challs = [\"dns-01\"]")).unwrap();
        let from_string = RenewalParameters::from_table(&table("pref_challs = \"dns-01\"")).unwrap();
        assert_eq!(from_list.pref_challs, from_string.pref_challs);
        assert_eq!(from_list.pref_challs, Some(vec![ChallengeType::Dns01]));
    }

    #[test]
    fn test_pref_challs_comma_string_with_aliases() {
        let params =
            RenewalParameters::from_table(&table("pref_challs = \"tls-alpn-01, http-01, dns\""))
                .unwrap();
        assert_eq!(
            params.pref_challs,
            Some(vec![
                ChallengeType::TlsAlpn01,
                ChallengeType::Http01,
                ChallengeType::Dns01,
            ])
        );
    }

    #[test]
    fn test_pref_challs_unknown_token() {
        let err = RenewalParameters::from_table(&table("pref_challs = \"finding-a-shrubbery\""))
            .unwrap_err();
        assert!(matches!(err, RestoreError::UnknownChallenge(_)));
    }

    #[test]
    fn test_webroot_map() {
        let params = RenewalParameters::from_table(&table(
            "webroot_map = { \"example.com\" = \"/var/www\" }",
        ))
        .unwrap();
        let Some(WebrootSource::Map(map)) = params.webroot else {
            panic!("expected webroot map");
        };
        assert_eq!(map["example.com"], "/var/www");
    }

    #[test]
    fn test_webroot_map_rejects_non_path_values() {
        let err = RenewalParameters::from_table(&table("webroot_map = { \"example.com\" = 1 }"))
            .unwrap_err();
        assert!(matches!(err, RestoreError::InvalidWebroot(_)));
    }

    #[test]
    fn test_ancient_webroot_path_string() {
        let params =
            RenewalParameters::from_table(&table("webroot_path = \"/var/www/\"")).unwrap();
        assert_eq!(
            params.webroot,
            Some(WebrootSource::Paths(vec!["/var/www/".to_string()]))
        );
    }

    #[test]
    fn test_webroot_path_none_literal_means_no_webroot() {
        let params = RenewalParameters::from_table(&table("webroot_path = \"None\"")).unwrap();
        assert_eq!(params.webroot, None);
    }

    #[test]
    fn test_webroot_map_wins_over_path() {
        let params = RenewalParameters::from_table(&table(
            "webroot_path = \"/old\"\nwebroot_map = { \"example.com\" = \"/new\" }",
        ))
        .unwrap();
        assert!(matches!(params.webroot, Some(WebrootSource::Map(_))));
    }

    #[test]
    fn test_plugin_extras_pass_through() {
        let params = RenewalParameters::from_table(&table(
            "authenticator = \"webroot\"\nwebroot_imaginary_flag = \"42\"",
        ))
        .unwrap();
        assert_eq!(params.authenticator.as_deref(), Some("webroot"));
        assert_eq!(params.extra["webroot_imaginary_flag"], "42");
    }
}
