//! CLI tool for minting and inspecting proxy descriptors
//!
//! Usage:
//!   streamproxy-url encode <url> [--header k=v ...] [--public-base /proxy]
//!   streamproxy-url decode <token>

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use streamproxy::{decode_descriptor, DescriptorCodec};

/// CLI tool for minting and inspecting StreamProxy descriptor tokens
#[derive(Parser, Debug)]
#[command(name = "streamproxy-url")]
#[command(author = "StreamProxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Mint and inspect proxy descriptor tokens")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode a target URL and headers into a proxy URL
    Encode {
        /// Absolute origin URL to proxy
        url: String,

        /// Header to forward upstream, as name=value (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Public base the proxy URL is minted under
        #[arg(long, env = "PUBLIC_BASE", default_value = "/proxy")]
        public_base: String,

        /// Print only the bare token instead of the full URL
        #[arg(long)]
        token_only: bool,
    },

    /// Decode a token back into its descriptor
    Decode {
        /// Descriptor token (the value of the data parameter)
        token: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Encode {
            url,
            headers,
            public_base,
            token_only,
        } => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                eprintln!("Target URL must be absolute (http:// or https://)");
                std::process::exit(1);
            }

            let mut header_map = HashMap::new();
            for header in &headers {
                match header.split_once('=') {
                    Some((name, value)) => {
                        header_map.insert(name.trim().to_string(), value.to_string());
                    }
                    None => {
                        eprintln!("Invalid header '{}', expected name=value", header);
                        std::process::exit(1);
                    }
                }
            }

            let codec = DescriptorCodec::new(public_base);
            let proxy_url = codec.proxy_url(&url, &header_map);

            if token_only {
                let token = proxy_url
                    .split("data=")
                    .nth(1)
                    .expect("minted URL always carries a data parameter");
                println!("{}", token);
            } else {
                println!("{}", proxy_url);
            }
        }

        Commands::Decode { token, json } => {
            let descriptor = match decode_descriptor(&token) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("Failed to decode token: {}", e);
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                println!("URL:     {}", descriptor.url);
                if descriptor.headers.is_empty() {
                    println!("Headers: (none)");
                } else {
                    println!("Headers:");
                    let mut names: Vec<&String> = descriptor.headers.keys().collect();
                    names.sort();
                    for name in names {
                        println!("  {}: {}", name, descriptor.headers[name]);
                    }
                }
            }
        }
    }

    Ok(())
}
