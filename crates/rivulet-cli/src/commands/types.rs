//! Processor type listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use rivulet_core::{ParamMap, ParamValue, ProcessorType};
use rivulet_extension::Extension;
use serde::Serialize;

use super::common::builtin_registry;

#[derive(Args)]
pub struct TypesArgs {
    /// Show details for a single type
    #[arg(value_name = "TYPE")]
    name: Option<String>,

    /// Print machine-readable JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Load extension libraries before listing
    #[arg(long = "extension", value_name = "LIB")]
    extensions: Vec<PathBuf>,
}

/// Serializable view of a [`ProcessorType`].
#[derive(Debug, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub description: &'static str,
    pub generator: &'static str,
    pub inlets: usize,
    pub outlets: usize,
    pub params: Vec<ParamInfo>,
}

/// Serializable view of one parameter declaration.
#[derive(Debug, Serialize)]
pub struct ParamInfo {
    pub name: &'static str,
    pub kind: &'static str,
    pub default: serde_json::Value,
}

fn json_value(value: &ParamValue) -> serde_json::Value {
    match value {
        ParamValue::Float(v) => serde_json::json!(v),
        ParamValue::Int(v) => serde_json::json!(v),
        ParamValue::Bool(v) => serde_json::json!(v),
        ParamValue::Text(v) => serde_json::json!(v),
        ParamValue::FloatArray(v) => serde_json::json!(v),
        ParamValue::Bang => serde_json::Value::Null,
    }
}

fn display_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Float(v) => format!("{v}"),
        ParamValue::Int(v) => format!("{v}"),
        ParamValue::Bool(v) => format!("{v}"),
        ParamValue::Text(v) => format!("\"{v}\""),
        ParamValue::FloatArray(v) => format!("{v:?}"),
        ParamValue::Bang => "-".to_string(),
    }
}

impl From<&ProcessorType> for TypeInfo {
    fn from(ty: &ProcessorType) -> Self {
        let (inlets, outlets) = ty.default_ports(&ParamMap::from_specs(ty.params()));
        Self {
            name: ty.name().to_string(),
            description: ty.description(),
            generator: ty.generator().name(),
            inlets,
            outlets,
            params: ty
                .params()
                .iter()
                .map(|spec| ParamInfo {
                    name: spec.name,
                    kind: spec.kind.name(),
                    default: json_value(&spec.default),
                })
                .collect(),
        }
    }
}

pub fn run(args: TypesArgs) -> anyhow::Result<()> {
    let registry = builtin_registry()?;
    for path in &args.extensions {
        Extension::load(path)?.register(&registry)?;
    }

    let mut types: Vec<Arc<ProcessorType>> = match &args.name {
        Some(name) => vec![
            registry
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown processor type: {}", name))?,
        ],
        None => registry.types(),
    };
    types.sort_by(|a, b| a.name().cmp(b.name()));

    if args.json {
        let infos: Vec<TypeInfo> = types.iter().map(|ty| TypeInfo::from(ty.as_ref())).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else if args.name.is_some() {
        for ty in &types {
            print_detail(ty);
        }
    } else {
        println!("Processor Types");
        println!("===============");
        println!();
        for ty in &types {
            let info = TypeInfo::from(ty.as_ref());
            println!(
                "  {:10} {:12} {}/{}  {}",
                info.name, info.generator, info.inlets, info.outlets, info.description
            );
        }
        println!();
        println!("Use 'rivulet types <name>' for parameter details.");
    }

    Ok(())
}

fn print_detail(ty: &ProcessorType) {
    let info = TypeInfo::from(ty);
    println!("{}", info.name);
    println!("{}", "=".repeat(info.name.len()));
    println!();
    println!("{}", info.description);
    println!();
    println!("Generator: {}", info.generator);
    println!("Ports:     {} in / {} out", info.inlets, info.outlets);
    println!();
    println!("Parameters:");
    println!();
    println!("  {:14}  {:12}  {}", "Name", "Type", "Default");
    println!("  {:14}  {:12}  {}", "----", "----", "-------");
    for spec in ty.params() {
        println!(
            "  {:14}  {:12}  {}",
            spec.name,
            spec.kind.name(),
            display_value(&spec.default)
        );
    }
}
