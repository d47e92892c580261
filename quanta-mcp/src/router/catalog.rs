//! Declarative tool catalog
//!
//! Two tables drive all dispatch. `routes` maps every outward tool name to either
//! a consolidated family (whose `method` selector picks the operation) or a
//! fixed canonical method. Each family's `methods` list is the allow-list for
//! its selector. Normalization is a pair of lookups, never a chain of string
//! checks.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use quanta_config::{FamilyDefinition, ToolsConfig};

use super::error::RoutingError;
use crate::protocol::Tool;

/// Separators accepted between a redundant family prefix and the method
const PREFIX_SEPARATORS: [char; 3] = ['_', '.', '/'];

/// Selector values that clients send when they have nothing to send
const PLACEHOLDER_METHODS: [&str; 3] = ["undefined", "null", "none"];

struct BuiltinFamily {
    name: &'static str,
    prefix: &'static str,
    aliases: &'static [&'static str],
    methods: &'static [&'static str],
    description: &'static str,
}

const BUILTIN_FAMILIES: &[BuiltinFamily] = &[
    BuiltinFamily {
        name: "cas",
        prefix: "cas",
        aliases: &["compute"],
        methods: &[
            "evaluate",
            "diff",
            "integrate",
            "solve_equation",
            "solve_ode",
            "propagate_uncertainty",
        ],
        description: "Computer algebra: evaluate, differentiate, integrate and solve expressions",
    },
    BuiltinFamily {
        name: "plot",
        prefix: "plot",
        aliases: &[],
        methods: &[
            "function_2d",
            "parametric_2d",
            "field_2d",
            "phase_portrait",
            "surface_3d",
            "contour_2d",
        ],
        description: "Plotting of functions, fields and surfaces; images are saved as session artifacts",
    },
    BuiltinFamily {
        name: "quantum",
        prefix: "quantum",
        aliases: &[],
        methods: &["ops", "solve", "visualize"],
        description: "Quantum mechanics: operator algebra, Schrodinger solvers and state visualization",
    },
    BuiltinFamily {
        name: "data",
        prefix: "data",
        aliases: &[],
        methods: &[
            "import_hdf5",
            "import_fits",
            "import_root",
            "export_hdf5",
            "fft",
            "filter",
            "spectrogram",
            "wavelet",
        ],
        description: "Scientific data import/export and signal processing",
    },
    BuiltinFamily {
        name: "api",
        prefix: "api",
        aliases: &[],
        methods: &["arxiv", "cern", "nasa", "nist"],
        description: "Queries against external scientific data services",
    },
    BuiltinFamily {
        name: "export",
        prefix: "export",
        aliases: &[],
        methods: &["overleaf", "github", "zenodo", "jupyter"],
        description: "Export results to publishing and collaboration platforms",
    },
    BuiltinFamily {
        name: "units",
        prefix: "units",
        aliases: &[],
        methods: &["convert"],
        description: "Unit conversion",
    },
    BuiltinFamily {
        name: "constants",
        prefix: "constants",
        aliases: &[],
        methods: &["get"],
        description: "Physical constants lookup",
    },
];

const BUILTIN_STANDALONE: &[(&str, &str, &str)] = &[
    (
        "tensor_algebra",
        "tensor",
        "Tensor calculus for a metric: Christoffel symbols, curvature tensors and geodesics",
    ),
    (
        "statmech_partition",
        "statmech",
        "Partition function and thermodynamic quantities for a set of energy levels",
    ),
    (
        "accel_caps",
        "accel",
        "Report the worker's hardware acceleration capabilities",
    ),
];

/// A consolidated tool: one outward name, many operations picked by `method`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFamily {
    pub name: String,
    pub prefix: String,
    pub aliases: Vec<String>,
    pub methods: Vec<String>,
    pub description: String,
}

impl ToolFamily {
    /// Canonical worker method for one of this family's operations
    pub fn canonical(&self, method: &str) -> String {
        format!("{}_{}", self.prefix, method)
    }

    fn allows(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Every prefix a client may put in front of a method name
    fn namespaces(&self) -> Vec<&str> {
        let mut namespaces = vec![self.name.as_str()];
        if self.prefix != self.name {
            namespaces.push(self.prefix.as_str());
        }
        namespaces.extend(self.aliases.iter().map(String::as_str));
        namespaces
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "enum": self.methods,
                    "description": "Operation to run"
                },
                "timeout_ms": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Optional per-call timeout in milliseconds"
                }
            },
            "required": ["method"],
            "additionalProperties": true
        })
    }
}

impl From<&FamilyDefinition> for ToolFamily {
    fn from(def: &FamilyDefinition) -> Self {
        Self {
            name: def.name.clone(),
            prefix: def.prefix.clone().unwrap_or_else(|| def.name.clone()),
            aliases: def.aliases.clone(),
            methods: def.methods.clone(),
            description: def
                .description
                .clone()
                .unwrap_or_else(|| format!("{} operations", def.name)),
        }
    }
}

/// A legacy tool that is not part of any consolidated family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneTool {
    pub name: String,
    pub family: String,
    pub description: String,
}

/// Result of normalizing one outward call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub raw_name: String,
    pub raw_params: Value,
    /// Capability family the canonical method belongs to
    pub family: String,
    pub normalized_method: String,
    pub normalized_params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Consolidated(usize),
    Fixed { family: String, method: String },
}

/// The outward tool surface and its mapping to worker methods
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    families: Vec<ToolFamily>,
    standalone: Vec<StandaloneTool>,
    routes: BTreeMap<String, Route>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolCatalog {
    /// The catalog of the stock worker
    pub fn builtin() -> Self {
        Self::build(builtin_families(), builtin_standalone(), &BTreeMap::new())
    }

    /// Built-in catalog extended (or overridden, by family name) from configuration
    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut families = builtin_families();
        for def in &config.families {
            let family = ToolFamily::from(def);
            match families.iter_mut().find(|f| f.name == family.name) {
                Some(existing) => *existing = family,
                None => families.push(family),
            }
        }
        Self::build(families, builtin_standalone(), &config.legacy_names)
    }

    fn build(
        families: Vec<ToolFamily>,
        standalone: Vec<StandaloneTool>,
        extra_legacy: &BTreeMap<String, String>,
    ) -> Self {
        let mut routes = BTreeMap::new();

        for (idx, family) in families.iter().enumerate() {
            routes.insert(family.name.clone(), Route::Consolidated(idx));
            for alias in &family.aliases {
                routes.insert(alias.clone(), Route::Consolidated(idx));
            }
        }

        for family in &families {
            for namespace in family.namespaces() {
                for method in &family.methods {
                    routes
                        .entry(format!("{}_{}", namespace, method))
                        .or_insert_with(|| Route::Fixed {
                            family: family.name.clone(),
                            method: family.canonical(method),
                        });
                }
            }
        }

        for tool in &standalone {
            routes.entry(tool.name.clone()).or_insert_with(|| Route::Fixed {
                family: tool.family.clone(),
                method: tool.name.clone(),
            });
        }

        for (name, method) in extra_legacy {
            if matches!(routes.get(name), Some(Route::Consolidated(_))) {
                continue;
            }
            let family = families
                .iter()
                .find(|f| f.methods.iter().any(|m| f.canonical(m) == *method))
                .map(|f| f.name.clone())
                .unwrap_or_else(|| name.clone());
            routes.insert(
                name.clone(),
                Route::Fixed {
                    family,
                    method: method.clone(),
                },
            );
        }

        Self {
            families,
            standalone,
            routes,
        }
    }

    pub fn families(&self) -> &[ToolFamily] {
        &self.families
    }

    pub fn standalone(&self) -> &[StandaloneTool] {
        &self.standalone
    }

    pub fn family(&self, name: &str) -> Option<&ToolFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Capability family names covered by this catalog
    pub fn family_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.families.iter().map(|f| f.name.clone()).collect();
        for tool in &self.standalone {
            if !names.contains(&tool.family) {
                names.push(tool.family.clone());
            }
        }
        names
    }

    /// Tool names advertised to clients
    pub fn tool_names(&self) -> Vec<String> {
        self.families
            .iter()
            .map(|f| f.name.clone())
            .chain(self.standalone.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Every name that routes to one fixed canonical method, with that method
    pub fn legacy_names(&self) -> Vec<(&str, &str)> {
        self.routes
            .iter()
            .filter_map(|(name, route)| match route {
                Route::Fixed { method, .. } => Some((name.as_str(), method.as_str())),
                Route::Consolidated(_) => None,
            })
            .collect()
    }

    /// Whether `name` is accepted as an outward tool name
    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Tool definitions for `tools/list`
    pub fn list_tools(&self) -> Vec<Tool> {
        let consolidated = self.families.iter().map(|family| Tool {
            name: family.name.clone(),
            description: family.description.clone(),
            input_schema: family.input_schema(),
        });
        let standalone = self.standalone.iter().map(|tool| Tool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: json!({
                "type": "object",
                "additionalProperties": true
            }),
        });
        consolidated.chain(standalone).collect()
    }

    /// Map an outward call onto a canonical worker method.
    ///
    /// The `method` selector (or the older `action` field when `method` is
    /// absent) is removed from the forwarded params. Every input either
    /// resolves to an allow-listed method or fails with a [`RoutingError`].
    pub fn normalize(&self, name: &str, params: &Value) -> Result<ToolInvocation, RoutingError> {
        let route = self
            .routes
            .get(name)
            .ok_or_else(|| RoutingError::UnknownTool {
                name: name.to_string(),
                available: self.tool_names(),
            })?;

        let mut args = match params {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(RoutingError::InvalidArguments {
                    tool: name.to_string(),
                    reason: format!("expected an object, got {}", json_type(other)),
                })
            }
        };
        let method = args.remove("method").filter(|v| !v.is_null());
        let action = args.remove("action").filter(|v| !v.is_null());

        let (family, normalized_method) = match route {
            Route::Consolidated(idx) => {
                let family = &self.families[*idx];
                let selected = resolve_method(family, name, method.or(action))?;
                (family.name.clone(), family.canonical(&selected))
            }
            Route::Fixed { family, method } => (family.clone(), method.clone()),
        };

        Ok(ToolInvocation {
            raw_name: name.to_string(),
            raw_params: params.clone(),
            family,
            normalized_method,
            normalized_params: Value::Object(args),
        })
    }
}

fn resolve_method(
    family: &ToolFamily,
    tool: &str,
    selector: Option<Value>,
) -> Result<String, RoutingError> {
    let raw = match selector {
        None => {
            return Err(RoutingError::MissingMethod {
                tool: tool.to_string(),
                allowed: family.methods.clone(),
            })
        }
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(RoutingError::InvalidMethodType {
                tool: tool.to_string(),
                found: json_type(&other),
            })
        }
    };

    let trimmed = raw.trim();
    if trimmed.is_empty()
        || PLACEHOLDER_METHODS
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
    {
        return Err(RoutingError::PlaceholderMethod {
            tool: tool.to_string(),
            value: raw.clone(),
            allowed: family.methods.clone(),
        });
    }

    let lowered = trimmed.to_ascii_lowercase();
    if family.allows(&lowered) {
        return Ok(lowered);
    }

    for namespace in family.namespaces() {
        let stripped = lowered
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix(PREFIX_SEPARATORS));
        if let Some(rest) = stripped {
            if family.allows(rest) {
                return Ok(rest.to_string());
            }
        }
    }

    Err(RoutingError::UnknownMethod {
        tool: tool.to_string(),
        method: trimmed.to_string(),
        allowed: family.methods.clone(),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn builtin_families() -> Vec<ToolFamily> {
    BUILTIN_FAMILIES
        .iter()
        .map(|f| ToolFamily {
            name: f.name.to_string(),
            prefix: f.prefix.to_string(),
            aliases: f.aliases.iter().map(|a| a.to_string()).collect(),
            methods: f.methods.iter().map(|m| m.to_string()).collect(),
            description: f.description.to_string(),
        })
        .collect()
}

fn builtin_standalone() -> Vec<StandaloneTool> {
    BUILTIN_STANDALONE
        .iter()
        .map(|(name, family, description)| StandaloneTool {
            name: name.to_string(),
            family: family.to_string(),
            description: description.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consolidated_and_legacy_agree() {
        let catalog = ToolCatalog::builtin();

        let consolidated = catalog
            .normalize("compute", &json!({"method": "evaluate", "expr": "2+2"}))
            .unwrap();
        let legacy = catalog
            .normalize("compute_evaluate", &json!({"expr": "2+2"}))
            .unwrap();

        assert_eq!(consolidated.normalized_method, "cas_evaluate");
        assert_eq!(consolidated.normalized_method, legacy.normalized_method);
        assert_eq!(consolidated.normalized_params, legacy.normalized_params);
        assert_eq!(consolidated.normalized_params, json!({"expr": "2+2"}));
        assert_eq!(consolidated.family, "cas");
        assert_eq!(consolidated.raw_name, "compute");
        assert_eq!(legacy.raw_params, json!({"expr": "2+2"}));
    }

    #[test]
    fn test_redundant_prefixes_are_stripped() {
        let catalog = ToolCatalog::builtin();
        for selector in ["plot_function_2d", "plot.function_2d", "plot/function_2d", " Function_2D "] {
            let invocation = catalog
                .normalize("plot", &json!({"method": selector}))
                .unwrap();
            assert_eq!(invocation.normalized_method, "plot_function_2d", "{}", selector);
        }

        let via_alias = catalog
            .normalize("cas", &json!({"method": "compute_diff"}))
            .unwrap();
        assert_eq!(via_alias.normalized_method, "cas_diff");
    }

    #[test]
    fn test_prefix_of_another_family_is_rejected() {
        let catalog = ToolCatalog::builtin();
        let err = catalog
            .normalize("plot", &json!({"method": "cas_function_2d"}))
            .unwrap_err();
        assert!(matches!(err, RoutingError::UnknownMethod { .. }));
    }

    #[test]
    fn test_placeholders_are_rejected() {
        let catalog = ToolCatalog::builtin();
        for selector in ["", "   ", "undefined", "UNDEFINED", "null"] {
            let err = catalog
                .normalize("quantum", &json!({"method": selector}))
                .unwrap_err();
            assert!(
                matches!(err, RoutingError::PlaceholderMethod { .. }),
                "{:?} gave {:?}",
                selector,
                err
            );
        }
    }

    #[test]
    fn test_missing_method_lists_allowed_set() {
        let catalog = ToolCatalog::builtin();
        let err = catalog.normalize("quantum", &json!({"psi": 1})).unwrap_err();
        assert_eq!(
            err,
            RoutingError::MissingMethod {
                tool: "quantum".into(),
                allowed: vec!["ops".into(), "solve".into(), "visualize".into()],
            }
        );
        assert!(err.to_string().contains("ops, solve, visualize"));
    }

    #[test]
    fn test_action_is_a_fallback_selector() {
        let catalog = ToolCatalog::builtin();
        let invocation = catalog
            .normalize("data", &json!({"action": "fft", "signal": [1, 2]}))
            .unwrap();
        assert_eq!(invocation.normalized_method, "data_fft");
        assert_eq!(invocation.normalized_params, json!({"signal": [1, 2]}));

        // method wins when both are present
        let invocation = catalog
            .normalize("data", &json!({"method": "filter", "action": "fft"}))
            .unwrap();
        assert_eq!(invocation.normalized_method, "data_filter");
        assert_eq!(invocation.normalized_params, json!({}));
    }

    #[test]
    fn test_non_string_method_is_rejected() {
        let catalog = ToolCatalog::builtin();
        let err = catalog.normalize("cas", &json!({"method": 7})).unwrap_err();
        assert_eq!(
            err,
            RoutingError::InvalidMethodType {
                tool: "cas".into(),
                found: "number"
            }
        );
    }

    #[test]
    fn test_unknown_tool_and_bad_arguments() {
        let catalog = ToolCatalog::builtin();
        let err = catalog.normalize("teleport", &json!({})).unwrap_err();
        match err {
            RoutingError::UnknownTool { available, .. } => {
                assert!(available.contains(&"cas".to_string()));
                assert!(available.contains(&"accel_caps".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = catalog.normalize("cas", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidArguments { .. }));
    }

    #[test]
    fn test_standalone_tools_route_to_themselves() {
        let catalog = ToolCatalog::builtin();
        let invocation = catalog.normalize("accel_caps", &Value::Null).unwrap();
        assert_eq!(invocation.normalized_method, "accel_caps");
        assert_eq!(invocation.family, "accel");
        assert_eq!(invocation.normalized_params, json!({}));
    }

    #[test]
    fn test_every_legacy_name_routes_to_an_allowed_method() {
        let catalog = ToolCatalog::builtin();
        let legacy = catalog.legacy_names();
        assert!(legacy.contains(&("compute_solve_ode", "cas_solve_ode")));
        assert!(legacy.contains(&("units_convert", "units_convert")));
        assert!(legacy.contains(&("statmech_partition", "statmech_partition")));

        for (name, method) in legacy {
            let invocation = catalog.normalize(name, &json!({})).unwrap();
            assert_eq!(invocation.normalized_method, method);
        }
    }

    #[test]
    fn test_config_extends_and_overrides_families() {
        let config = ToolsConfig {
            families: vec![
                FamilyDefinition {
                    name: "ml".into(),
                    prefix: None,
                    aliases: vec!["learn".into()],
                    methods: vec!["symbolic_regression".into()],
                    description: None,
                },
                FamilyDefinition {
                    name: "api".into(),
                    prefix: None,
                    aliases: vec![],
                    methods: vec!["arxiv".into()],
                    description: Some("arXiv only".into()),
                },
            ],
            legacy_names: BTreeMap::from([(
                "symreg".to_string(),
                "ml_symbolic_regression".to_string(),
            )]),
            ..Default::default()
        };
        let catalog = ToolCatalog::from_config(&config);

        let invocation = catalog
            .normalize("learn", &json!({"method": "ml_symbolic_regression"}))
            .unwrap();
        assert_eq!(invocation.normalized_method, "ml_symbolic_regression");

        let invocation = catalog.normalize("symreg", &json!({})).unwrap();
        assert_eq!(invocation.family, "ml");

        assert!(catalog.normalize("api", &json!({"method": "nasa"})).is_err());
        assert_eq!(catalog.family("api").unwrap().description, "arXiv only");
    }

    #[test]
    fn test_tools_list_advertises_method_enum() {
        let catalog = ToolCatalog::builtin();
        let tools = catalog.list_tools();
        let units = tools.iter().find(|t| t.name == "units").unwrap();
        assert_eq!(units.input_schema["properties"]["method"]["enum"], json!(["convert"]));
        assert_eq!(units.input_schema["required"], json!(["method"]));
        assert_eq!(tools.len(), catalog.tool_names().len());
    }
}
