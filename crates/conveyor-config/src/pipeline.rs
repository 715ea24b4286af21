//! Pipeline configuration parsing.

use crate::{ConfigError, ConfigResult};
use conveyor_core::config::{JobConfig, ResourceConfig, ResourceType, StepConfig};
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A parsed pipeline definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub resources: Vec<ResourceConfig>,
    pub resource_types: Vec<ResourceType>,
    pub jobs: Vec<JobConfig>,
}

impl PipelineConfig {
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Read and parse a pipeline configuration file.
pub fn load_pipeline_config(path: impl AsRef<Path>) -> ConfigResult<PipelineConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_pipeline_config(&text)
}

/// Parse a pipeline configuration from KDL text.
pub fn parse_pipeline_config(kdl: &str) -> ConfigResult<PipelineConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = PipelineConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "resource" => config.resources.push(parse_resource(node)?),
            "resource_type" | "resource-type" => {
                config.resource_types.push(parse_resource_type(node)?)
            }
            "job" => config.jobs.push(parse_job(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    validate(&config)?;

    Ok(config)
}

fn parse_resource(node: &KdlNode) -> ConfigResult<ResourceConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource name".to_string()))?;
    let type_ = get_string_prop(node, "type")
        .ok_or_else(|| ConfigError::MissingField(format!("type for resource '{}'", name)))?;

    Ok(ResourceConfig {
        source: get_child_object(node, "source").unwrap_or_else(empty_object),
        name,
        type_,
    })
}

fn parse_resource_type(node: &KdlNode) -> ConfigResult<ResourceType> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource type name".to_string()))?;
    let type_ = get_string_prop(node, "type").ok_or_else(|| {
        ConfigError::MissingField(format!("type for resource type '{}'", name))
    })?;

    Ok(ResourceType {
        source: get_child_object(node, "source").unwrap_or_else(empty_object),
        privileged: get_bool_prop(node, "privileged").unwrap_or(false),
        name,
        type_,
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let raw_max_in_flight = match node.get("max_in_flight") {
        None => 0,
        Some(value) => value
            .as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("max_in_flight of job '{}'", name),
                message: "expected a non-negative integer".to_string(),
            })?,
    };

    let mut plan = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "plan" {
                plan = parse_steps(child)?;
            }
        }
    }

    Ok(JobConfig {
        serial: get_bool_prop(node, "serial").unwrap_or(false),
        serial_groups: get_string_list_prop(node, "serial_groups"),
        raw_max_in_flight,
        plan,
        name,
    })
}

fn parse_steps(node: &KdlNode) -> ConfigResult<Vec<StepConfig>> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };
    children.nodes().iter().map(parse_step).collect()
}

fn parse_step(node: &KdlNode) -> ConfigResult<StepConfig> {
    let kind = node.name().value();
    match kind {
        "get" => Ok(StepConfig::Get {
            name: step_name(node, kind)?,
            resource: get_string_prop(node, "resource"),
            passed: get_string_list_prop(node, "passed"),
            trigger: get_bool_prop(node, "trigger").unwrap_or(false),
            params: get_child_object(node, "params"),
        }),
        "put" => Ok(StepConfig::Put {
            name: step_name(node, kind)?,
            resource: get_string_prop(node, "resource"),
            params: get_child_object(node, "params"),
        }),
        "task" => Ok(StepConfig::Task {
            name: step_name(node, kind)?,
            file: get_string_prop(node, "file"),
            privileged: get_bool_prop(node, "privileged").unwrap_or(false),
        }),
        "aggregate" => Ok(StepConfig::Aggregate(parse_steps(node)?)),
        "do" => Ok(StepConfig::Do(parse_steps(node)?)),
        other => Err(ConfigError::InvalidValue {
            field: "plan step".to_string(),
            message: format!("unknown step type: {}", other),
        }),
    }
}

fn step_name(node: &KdlNode, kind: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(format!("{} step name", kind)))
}

/// Check names are unique and every reference points at something declared.
fn validate(config: &PipelineConfig) -> ConfigResult<()> {
    check_unique("resource", config.resources.iter().map(|r| r.name.as_str()))?;
    check_unique(
        "resource type",
        config.resource_types.iter().map(|t| t.name.as_str()),
    )?;
    check_unique("job", config.jobs.iter().map(|j| j.name.as_str()))?;

    let resources: HashSet<&str> = config.resources.iter().map(|r| r.name.as_str()).collect();
    let jobs: HashSet<&str> = config.jobs.iter().map(|j| j.name.as_str()).collect();

    for job in &config.jobs {
        validate_steps(&job.name, &job.plan, &resources, &jobs)?;
    }
    Ok(())
}

fn validate_steps(
    job: &str,
    steps: &[StepConfig],
    resources: &HashSet<&str>,
    jobs: &HashSet<&str>,
) -> ConfigResult<()> {
    for step in steps {
        if let Some(resource) = step.resource_name() {
            if !resources.contains(resource) {
                return Err(ConfigError::InvalidReference(format!(
                    "job '{}' refers to unknown resource '{}'",
                    job, resource
                )));
            }
        }
        match step {
            StepConfig::Get { passed, .. } => {
                if let Some(unknown) = passed.iter().find(|p| !jobs.contains(p.as_str())) {
                    return Err(ConfigError::InvalidReference(format!(
                        "job '{}' expects inputs to have passed unknown job '{}'",
                        job, unknown
                    )));
                }
            }
            StepConfig::Aggregate(nested) | StepConfig::Do(nested) => {
                validate_steps(job, nested, resources, jobs)?
            }
            StepConfig::Put { .. } | StepConfig::Task { .. } => {}
        }
    }
    Ok(())
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate(format!("{} '{}'", kind, name)));
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    let mut result = Vec::new();

    // Repeated properties (passed="a" passed="b")
    for entry in node.entries() {
        if let Some(entry_name) = entry.name() {
            if entry_name.value() == name {
                if let Some(s) = entry.value().as_string() {
                    result.push(s.to_string());
                }
            }
        }
    }

    if !result.is_empty() {
        return result;
    }

    // Block syntax (passed "a" "b")
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == name {
                return get_all_string_args(child);
            }
        }
    }

    Vec::new()
}

/// Convert a `name { key "value" ... }` child block into a JSON object.
fn get_child_object(node: &KdlNode, name: &str) -> Option<serde_json::Value> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
        .map(node_to_object)
}

fn node_to_object(node: &KdlNode) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = if child.children().is_some() {
                node_to_object(child)
            } else {
                child
                    .entries()
                    .iter()
                    .find(|e| e.name().is_none())
                    .map(|e| kdl_to_json(e.value()))
                    .unwrap_or(serde_json::Value::Null)
            };
            map.insert(key, value);
        }
    }
    serde_json::Value::Object(map)
}

fn kdl_to_json(value: &KdlValue) -> serde_json::Value {
    match value {
        KdlValue::String(s) => serde_json::Value::String(s.clone()),
        KdlValue::Integer(n) => i64::try_from(*n)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(n.to_string())),
        KdlValue::Float(f) => serde_json::Value::from(*f),
        KdlValue::Bool(b) => serde_json::Value::Bool(*b),
        KdlValue::Null => serde_json::Value::Null,
    }
}
