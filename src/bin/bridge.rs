//! Command line entry point: generate, validate, serve, strip

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use grpc_graphql_bridge::descriptor::{ProtoService, ServiceRegistry};
use grpc_graphql_bridge::directives::ServiceDecl;
use grpc_graphql_bridge::federation::{strip_mapping_sdl, to_plain_sdl};
use grpc_graphql_bridge::gateway::ServeMux;
use grpc_graphql_bridge::{generate, validate};
use prost_reflect::DescriptorPool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grpc-graphql-bridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize an SDL scaffold from a protobuf service
    Generate(GenerateArgs),
    /// Check a schema's directives against its protobuf descriptors
    Validate(SchemaArgs),
    /// Serve a schema as a GraphQL endpoint
    Serve(ServeArgs),
    /// Print the schema with all mapping directives removed
    Strip(StripArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Logical service name used in the schema, e.g. POSTS
    #[arg(long)]
    name: String,
    /// Path to a binary descriptor set file
    #[arg(long)]
    proto: String,
    /// Fully-qualified protobuf service name, e.g. posts.Posts
    #[arg(long)]
    service: String,
    /// Backend address, host:port
    #[arg(long)]
    address: String,
}

#[derive(Args)]
struct SchemaArgs {
    /// Path to the SDL file
    #[arg(long)]
    schema: String,
    /// Treat the input as federation-subgraph SDL
    #[arg(long)]
    federated: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    #[arg(long, default_value_t = 4000)]
    port: u16,
}

#[derive(Args)]
struct StripArgs {
    /// Path to the SDL file
    #[arg(long)]
    schema: String,
}

fn load_sdl(args: &SchemaArgs) -> anyhow::Result<String> {
    let sdl = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("reading {}", args.schema))?;
    if args.federated {
        Ok(to_plain_sdl(&sdl)?)
    } else {
        Ok(sdl)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => {
            let decl = ServiceDecl {
                name: args.name,
                proto_file: args.proto,
                service_name: args.service,
                address: args.address,
                metadata: vec![],
            };
            let bytes = std::fs::read(&decl.proto_file)
                .with_context(|| format!("reading {}", decl.proto_file))?;
            let pool = DescriptorPool::decode(bytes.as_slice())
                .with_context(|| format!("decoding {}", decl.proto_file))?;
            let service = Arc::new(ProtoService::new(&decl, pool)?);
            println!("{}", generate::generate(&[service])?);
        }
        Command::Validate(args) => {
            let sdl = load_sdl(&args)?;
            let errors = validate::validate_sdl(&sdl)?;
            if errors.is_empty() {
                println!("Valid schema");
            } else {
                for error in &errors {
                    println!("{error}");
                }
                std::process::exit(1);
            }
        }
        Command::Serve(args) => {
            let sdl = load_sdl(&args.schema)?;
            let errors = validate::validate_sdl(&sdl)?;
            if !errors.is_empty() {
                for error in &errors {
                    eprintln!("{error}");
                }
                bail!("schema failed validation");
            }
            let mux = ServeMux::from_sdl(&sdl)?;
            mux.serve(&format!("0.0.0.0:{}", args.port)).await?;
        }
        Command::Strip(args) => {
            let sdl = std::fs::read_to_string(&args.schema)
                .with_context(|| format!("reading {}", args.schema))?;
            println!("{}", strip_mapping_sdl(&sdl)?);
        }
    }
    Ok(())
}
