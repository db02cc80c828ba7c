use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use axum::http::Method;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;

use odata_authz::authz::resolve;
use odata_authz::model::EdmModel;
use odata_authz::path::{ExpandClause, ODataPath};

#[derive(Parser, Debug)]
#[command(author, version, about = "OData capability restriction checker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the scopes a request needs and check a scope set against them
    Check {
        /// Model document (defaults to ODATA_MODEL_PATH)
        #[arg(long, env = "ODATA_MODEL_PATH")]
        model: PathBuf,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Resource path relative to the service root, e.g. `Customers(1)/Orders`
        #[arg(long)]
        path: String,
        /// Raw `$expand` value
        #[arg(long)]
        expand: Option<String>,
        /// Granted scope; repeat for several
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and validate a model document
    Validate {
        #[arg(long, env = "ODATA_MODEL_PATH")]
        model: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            model,
            method,
            path,
            expand,
            scopes,
            json,
        } => check(&model, &method, &path, expand.as_deref(), scopes, json),
        Commands::Validate { model } => {
            let loaded = EdmModel::from_path(&model)?;
            println!(
                "{}: {} entity sets, {} singletons, {} operations, {} operation imports",
                model.display(),
                loaded.entity_sets.len(),
                loaded.singletons.len(),
                loaded.operations.len(),
                loaded.operation_imports.len()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check(
    model_path: &Path,
    method: &str,
    path: &str,
    expand: Option<&str>,
    scopes: Vec<String>,
    as_json: bool,
) -> anyhow::Result<ExitCode> {
    let model = EdmModel::from_path(model_path)?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method `{method}`"))?;

    let parsed = match ODataPath::parse(&model, path.trim_start_matches('/')) {
        Ok(parsed) => parsed,
        Err(err) => {
            if as_json {
                println!("{}", json!({"allowed": true, "modeled": false, "reason": err.to_string()}));
            } else {
                println!("not modeled ({err}); no capability restrictions apply");
                println!("allowed");
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    let expand = expand
        .map(|text| ExpandClause::parse(&model, &parsed, text))
        .transpose()
        .context("invalid $expand")?;

    let requirement = resolve(&model, &method, &parsed, expand.as_ref());
    let granted: HashSet<String> = scopes.into_iter().collect();
    let allowed = requirement.allows_scopes(&granted);

    if as_json {
        let out = json!({
            "allowed": allowed,
            "modeled": true,
            "requirement": requirement.to_string(),
            "requirement_tree": requirement,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{:<12} {} {}", "Request", method, parsed);
        println!("{:<12} {}", "Requirement", requirement);
        println!("{:<12} {}", "Decision", if allowed { "allowed" } else { "denied" });
    }

    Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
