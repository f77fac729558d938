//! Router Options & Guidelines Surface (spec.md §4.7): direct options,
//! per-router overrides, the `tag:<name>` namespace, and routing
//! guideline version compatibility.

use crate::error::{AdminError, Result};
use crate::metadata::model::{Router, RoutingGuideline, RoutingOptions};
use crate::metadata::MetadataStore;
use serde_json::Value;
use tracing::warn;

/// Known built-in option names and their expected JSON type. Anything
/// under `tag:` is free-form and skips this table.
fn builtin_option_type(name: &str) -> Option<&'static str> {
    match name {
        "_hidden" => Some("bool"),
        "invalidated_cluster_policy" => Some("string"),
        "target_cluster" => Some("string"),
        "use_replica_primary_as_rw" => Some("bool"),
        "stats_updates_frequency" => Some("number"),
        _ => None,
    }
}

/// Validate and, where the spec's Open Question resolves to coercion,
/// coerce a value destined for `global`/per-router option storage
/// (spec.md §9: "does `validate_set_option_namespace` coerce non-null,
/// wrong-typed tag values, or error?").
///
/// Resolved: non-`tag:` built-ins are type-checked strictly (error on
/// mismatch, mirroring a typed router-options schema); `tag:<name>`
/// values are accepted as-is without coercion, since tags are
/// explicitly user-defined and router-opaque (spec.md §4.7, "Open
/// Questions"; decision recorded in DESIGN.md).
pub fn validate_set_option_namespace(name: &str, value: &Value) -> Result<Value> {
    if let Some(tag) = name.strip_prefix("tag:") {
        if tag.is_empty() {
            return Err(AdminError::BadArgument("tag name must not be empty".to_string()));
        }
        return Ok(value.clone());
    }

    match builtin_option_type(name) {
        Some("bool") if !value.is_boolean() && !value.is_null() => Err(AdminError::BadArgument(format!(
            "option '{name}' expects a boolean, got {value}"
        ))),
        Some("number") if !value.is_number() && !value.is_null() => Err(AdminError::BadArgument(format!(
            "option '{name}' expects a number, got {value}"
        ))),
        Some("string") if !value.is_string() && !value.is_null() => Err(AdminError::BadArgument(format!(
            "option '{name}' expects a string, got {value}"
        ))),
        _ => Ok(value.clone()),
    }
}

/// `setRoutingOption`: set a global or per-router option, warning when a
/// per-router override shadows a global value the caller may not expect
/// (spec.md §4.7).
pub async fn set_routing_option(
    metadata: &MetadataStore,
    cluster_id: &str,
    router: Option<&str>,
    name: &str,
    value: Value,
) -> Result<()> {
    let validated = validate_set_option_namespace(name, &value)?;
    let mut options = metadata.routing_options(cluster_id).await?;

    match router {
        None => {
            options.global.insert(name.to_string(), validated);
        }
        Some(router_name) => {
            if options.global.contains_key(name) {
                warn!(
                    target: "router",
                    "per-router override of '{name}' for '{router_name}' shadows an existing global value"
                );
            }
            options
                .per_router
                .entry(router_name.to_string())
                .or_default()
                .insert(name.to_string(), validated);
        }
    }

    let mut tx = metadata.begin_transaction();
    tx.put_routing_options(cluster_id, options);
    tx.commit().await?;
    Ok(())
}

/// Effective value for one option at one router: per-router override,
/// else global, else `None` (spec.md §4.7's precedence rule).
pub fn effective_option<'a>(options: &'a RoutingOptions, router: &str, name: &str) -> Option<&'a Value> {
    options
        .per_router
        .get(router)
        .and_then(|overrides| overrides.get(name))
        .or_else(|| options.global.get(name))
}

/// Parse a routing-guideline document version string `"major.minor"`.
fn parse_guideline_version(version: &str) -> Result<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| AdminError::BadArgument(format!("invalid guideline version '{version}'")))?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Ok((major, minor))
}

/// A guideline is usable by a router only if the major version differs
/// by at most one and the guideline's version does not exceed what the
/// router declares it supports (spec.md §4.7).
pub fn guideline_compatible_with_router(guideline: &RoutingGuideline, router: &Router) -> Result<()> {
    let (g_major, g_minor) = parse_guideline_version(&guideline.version)?;
    let (r_major, r_minor) = parse_guideline_version(&router.supported_guideline_version)?;

    let major_diff = g_major.abs_diff(r_major);
    let too_new = g_major > r_major || (g_major == r_major && g_minor > r_minor);

    if major_diff > 1 || too_new {
        return Err(AdminError::RoutingGuidelineInvalidVersion {
            name: guideline.name.clone(),
            version: guideline.version.clone(),
            router: router.name.clone(),
            supported: router.supported_guideline_version.clone(),
        });
    }
    Ok(())
}

/// `createRoutingGuideline` / `importRoutingGuideline`: reject the
/// document if any currently registered router cannot consume it.
pub async fn create_or_import_guideline(
    metadata: &MetadataStore,
    cluster_set_id: &str,
    cluster_id: &str,
    guideline: RoutingGuideline,
) -> Result<()> {
    let routers = metadata.routers(cluster_id).await?;
    for router in &routers {
        guideline_compatible_with_router(&guideline, router)?;
    }
    let mut tx = metadata.begin_transaction();
    tx.put_guideline(guideline);
    let _ = cluster_set_id;
    tx.commit().await?;
    Ok(())
}

/// `removeRoutingGuideline`: refuse when it is the cluster set's active
/// guideline (spec.md §4.7's `ROUTING_GUIDELINE_IN_USE` guard).
pub async fn remove_routing_guideline(
    metadata: &MetadataStore,
    cluster_id: &str,
    cluster_set_id: &str,
    name: &str,
) -> Result<()> {
    let options = metadata.routing_options(cluster_id).await?;
    if options.active_guideline.as_deref() == Some(name) {
        return Err(AdminError::RoutingGuidelineInUse(name.to_string()));
    }
    let mut tx = metadata.begin_transaction();
    tx.delete_guideline(cluster_set_id, name);
    tx.commit().await?;
    Ok(())
}

/// `getRoutingGuideline`: fetch by name.
pub async fn get_routing_guideline(
    metadata: &MetadataStore,
    cluster_set_id: &str,
    name: &str,
) -> Result<RoutingGuideline> {
    metadata
        .routing_guidelines(cluster_set_id)
        .await?
        .into_iter()
        .find(|g| g.name == name)
        .ok_or_else(|| AdminError::MetadataMissing(format!("routing guideline '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guideline(version: &str) -> RoutingGuideline {
        RoutingGuideline {
            name: "g".into(),
            cluster_set_id: "cs".into(),
            version: version.into(),
            document: Value::Null,
        }
    }

    fn router(supported: &str) -> Router {
        Router {
            hostname: "router1".into(),
            name: "router1".into(),
            version: "8.1.0".into(),
            supported_guideline_version: supported.into(),
            last_check_in: String::new(),
        }
    }

    #[test]
    fn guideline_one_major_ahead_is_rejected() {
        let g = guideline("3.0");
        let r = router("1.0");
        assert!(guideline_compatible_with_router(&g, &r).is_err());
    }

    #[test]
    fn guideline_within_one_major_and_not_newer_is_accepted() {
        let g = guideline("1.0");
        let r = router("2.5");
        assert!(guideline_compatible_with_router(&g, &r).is_ok());
    }

    #[test]
    fn tag_namespace_values_are_never_coerced_or_type_checked() {
        let v = Value::String("anything".into());
        assert_eq!(validate_set_option_namespace("tag:region", &v).unwrap(), v);
    }

    #[test]
    fn builtin_bool_option_rejects_string_value() {
        let v = Value::String("yes".into());
        assert!(validate_set_option_namespace("_hidden", &v).is_err());
    }
}
