use std::io::Read;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tessera_auth::{synthesize, user_info, PrincipalConfig};
use tessera_convert::{entity_to_value, resource_to_entity};
use tessera_core::{namespace_for_tenant, ResourceKey};
use tracing::info;

mod doc;

use doc::EntityDoc;

#[derive(Parser, Debug)]
#[command(name = "tesseractl", version, about = "Tessera CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a resource key and show its tenant and GRN
    Key {
        /// Key, e.g. "/playlist.grafana.app/playlists/tenant-3/weekly"
        key: String,
        /// Object kind used for the GRN (defaults to the key's kind segment)
        #[arg(long = "kind")]
        kind: Option<String>,
    },
    /// Print the namespace a tenant id maps to
    Namespace {
        tenant: i64,
    },
    /// Convert an entity document (JSON, "-" for stdin) into a resource object
    ToResource {
        file: String,
    },
    /// Convert a resource object (JSON or YAML, "-" for stdin) into an entity document
    ToEntity {
        /// Key the object is stored under
        #[arg(long = "key")]
        key: String,
        file: String,
    },
    /// Synthesize the principal for a user name, extras and namespace
    Principal {
        #[arg(long = "user")]
        user: String,
        /// Extra attribute as key=value; repeatable
        #[arg(long = "extra")]
        extra: Vec<String>,
        /// Requested namespace
        #[arg(long = "ns", default_value = "")]
        namespace: String,
    },
}

fn init_tracing() {
    let env = std::env::var("TESSERA_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s).context("reading stdin")?;
        Ok(s)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path))
    }
}

fn print<T: Serialize>(output: Output, v: &T) -> Result<()> {
    match output {
        Output::Human => print!("{}", serde_yaml::to_string(v)?),
        Output::Json => println!("{}", serde_json::to_string_pretty(v)?),
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Key { key, kind } => {
            let k = ResourceKey::parse(&key)?;
            let grn = k.to_grn(kind.as_deref().unwrap_or(&k.kind))?;
            match cli.output {
                Output::Human => {
                    println!("group:     {}", k.group);
                    println!("kind:      {}", k.kind);
                    println!("namespace: {}", k.namespace);
                    println!("name:      {}", k.name);
                    println!("tenant:    {}", grn.tenant_id);
                    println!("grn:       {}", grn);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "key": k, "grn": grn }))?),
            }
        }
        Commands::Namespace { tenant } => {
            if tenant < 1 {
                bail!("tenant id must be >= 1, got {}", tenant);
            }
            println!("{}", namespace_for_tenant(tenant));
        }
        Commands::ToResource { file } => {
            let doc: EntityDoc = serde_json::from_str(&read_input(&file)?).context("parsing entity document")?;
            let obj = entity_to_value(&doc.into_entity()?)?;
            info!(file = %file, "converted entity to resource");
            print(cli.output, &obj)?;
        }
        Commands::ToEntity { key, file } => {
            // YAML is a superset of JSON, so one parser covers both inputs
            let raw = read_input(&file)?;
            let obj: serde_json::Value = serde_yaml::from_str(&raw).context("parsing resource document")?;
            let entity = resource_to_entity(&key, &obj)?;
            info!(file = %file, key = %key, "converted resource to entity");
            print(cli.output, &EntityDoc::from_entity(entity)?)?;
        }
        Commands::Principal { user, extra, namespace } => {
            let pairs = extra
                .iter()
                .map(|kv| kv.split_once('=').ok_or_else(|| anyhow!("invalid --extra {:?}, expected key=value", kv)))
                .collect::<Result<Vec<_>>>()?;
            let info = user_info(&user, pairs);
            let p = synthesize(Some(&info), &namespace, &PrincipalConfig::from_env())?;
            print(cli.output, &p)?;
        }
    }
    Ok(())
}
