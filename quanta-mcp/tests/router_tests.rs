use serde_json::{json, Value};
use std::collections::BTreeSet;

use quanta_mcp::{RoutingError, ToolCatalog};

fn canonical_methods(catalog: &ToolCatalog) -> BTreeSet<String> {
    let mut methods: BTreeSet<String> = catalog
        .families()
        .iter()
        .flat_map(|f| f.methods.iter().map(move |m| f.canonical(m)))
        .collect();
    methods.extend(catalog.standalone().iter().map(|t| t.name.clone()));
    methods
}

#[test]
fn test_every_consolidated_method_matches_its_legacy_name() {
    let catalog = ToolCatalog::builtin();
    let params = json!({"x": 1, "nested": {"y": [1, 2]}});

    for family in catalog.families() {
        let mut names = vec![family.name.clone()];
        names.extend(family.aliases.iter().cloned());

        for name in &names {
            for method in &family.methods {
                let mut args = params.clone();
                args["method"] = json!(method);
                let consolidated = catalog.normalize(name, &args).unwrap();

                let legacy_name = format!("{}_{}", name, method);
                let legacy = catalog.normalize(&legacy_name, &params).unwrap();

                assert_eq!(consolidated.normalized_method, legacy.normalized_method);
                assert_eq!(consolidated.normalized_params, legacy.normalized_params);
                assert_eq!(consolidated.normalized_params, params);
                assert_eq!(consolidated.family, legacy.family);
            }
        }
    }
}

#[test]
fn test_normalization_is_total_over_awkward_inputs() {
    let catalog = ToolCatalog::builtin();
    let allowed = canonical_methods(&catalog);

    let selectors = [
        Value::Null,
        json!(""),
        json!("  "),
        json!("undefined"),
        json!("NULL"),
        json!("evaluate"),
        json!("EVALUATE"),
        json!("cas_evaluate"),
        json!("compute.diff"),
        json!("cas/solve_ode"),
        json!("cas_"),
        json!("_evaluate"),
        json!("plot_function_2d"),
        json!("fft"),
        json!("convert"),
        json!("ünïcödé"),
        json!(42),
        json!(true),
        json!(["evaluate"]),
        json!({"name": "evaluate"}),
    ];
    let mut names: Vec<String> = catalog.tool_names();
    names.extend(catalog.legacy_names().into_iter().map(|(n, _)| n.to_string()));
    names.extend(["", "CAS", "cas ", "plot_", "unknown"].map(String::from));

    for name in &names {
        for selector in &selectors {
            for shape in [
                json!({"method": selector}),
                json!({"action": selector}),
                json!({"method": selector, "action": "evaluate"}),
            ] {
                match catalog.normalize(name, &shape) {
                    Ok(invocation) => {
                        assert!(
                            allowed.contains(&invocation.normalized_method),
                            "{} with {} produced {}",
                            name,
                            shape,
                            invocation.normalized_method
                        );
                        assert!(invocation.normalized_params.get("method").is_none());
                        assert!(invocation.normalized_params.get("action").is_none());
                    }
                    Err(e) => assert!(!e.to_string().is_empty()),
                }
            }
        }

        for params in [Value::Null, json!([]), json!("evaluate"), json!(3.5)] {
            if let Ok(invocation) = catalog.normalize(name, &params) {
                assert!(allowed.contains(&invocation.normalized_method));
            }
        }
    }
}

#[test]
fn test_null_method_falls_back_to_action() {
    let catalog = ToolCatalog::builtin();
    let invocation = catalog
        .normalize("cas", &json!({"method": null, "action": "integrate", "expr": "x"}))
        .unwrap();
    assert_eq!(invocation.normalized_method, "cas_integrate");
    assert_eq!(invocation.normalized_params, json!({"expr": "x"}));
    assert_eq!(
        invocation.raw_params,
        json!({"method": null, "action": "integrate", "expr": "x"})
    );
}

#[test]
fn test_rejections_name_the_allowed_methods() {
    let catalog = ToolCatalog::builtin();

    let err = catalog
        .normalize("export", &json!({"method": "dropbox"}))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unknown method 'dropbox' for tool 'export'. Allowed methods: overleaf, github, zenodo, jupyter"
    );

    let err = catalog.normalize("api", &json!({"method": "undefined"})).unwrap_err();
    assert!(matches!(err, RoutingError::PlaceholderMethod { ref value, .. } if value == "undefined"));
    assert_eq!(err.kind(), "placeholder_method");
}
