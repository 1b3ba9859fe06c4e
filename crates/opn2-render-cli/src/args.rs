//! Command-line argument parsing for the OPN2 render CLI.
//!
//! This module handles parsing and validation of CLI arguments including:
//! - Register script path specification
//! - Synthesis backend selection (tabular or modeled)
//! - Output WAV path
//! - Help text generation

use std::env;

use opn2_common::BackendKind;

/// Parsed command-line arguments.
#[derive(Debug)]
pub struct CliArgs {
    /// Register script path to render
    pub script_path: Option<String>,
    /// Output WAV path
    pub output_path: String,
    /// Backend override (None = use script/config default)
    pub backend_override: Option<BackendKind>,
    /// Optional engine configuration JSON path
    pub config_path: Option<String>,
    /// Whether help was requested
    pub show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            script_path: None,
            output_path: "out.wav".to_string(),
            backend_override: None,
            config_path: None,
            show_help: false,
        }
    }
}

impl CliArgs {
    /// Parse arguments from command line.
    pub fn parse() -> Self {
        let mut args = Self::default();
        let mut iter = env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => {
                    args.show_help = true;
                }
                "--output" | "-o" => {
                    if let Some(value) = iter.next() {
                        args.output_path = value;
                    } else {
                        eprintln!("--output requires a file path");
                        args.show_help = true;
                    }
                }
                "--backend" => {
                    if let Some(value) = iter.next() {
                        match value.parse::<BackendKind>() {
                            Ok(kind) => args.backend_override = Some(kind),
                            Err(_) => {
                                eprintln!("Unknown backend: {}", value);
                                args.show_help = true;
                            }
                        }
                    } else {
                        eprintln!("--backend requires an argument (tabular, modeled)");
                        args.show_help = true;
                    }
                }
                _ if arg.starts_with("--backend=") => {
                    let value = &arg[10..];
                    match value.parse::<BackendKind>() {
                        Ok(kind) => args.backend_override = Some(kind),
                        Err(_) => {
                            eprintln!("Unknown backend: {}", value);
                            args.show_help = true;
                        }
                    }
                }
                "--config" => {
                    if let Some(value) = iter.next() {
                        args.config_path = Some(value);
                    } else {
                        eprintln!("--config requires a file path");
                        args.show_help = true;
                    }
                }
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {}", arg);
                    args.show_help = true;
                }
                _ => {
                    args.script_path = Some(arg);
                }
            }
        }

        args
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  opn2-render [--backend <kind>] [--config <file.json>] [-o <out.wav>] <script.json>\n\n\
             Flags:\n\
             \x20 --backend <kind>     Select synthesis backend:\n\
             \x20                        - tabular (default, register-exact)\n\
             \x20                        - modeled (lightweight softsynth)\n\
             \x20 --config <file>      Engine configuration JSON (clocks, volume)\n\
             \x20 -o, --output <file>  Output WAV path (default out.wav)\n\
             \x20 -h, --help           Show this help\n\n\
             Script Format:\n\
             \x20 JSON with an \"events\" array of register writes, waits and renders:\n\
             \x20   {{\"write\": {{\"addr\": 40, \"value\": 240}}}}\n\
             \x20   {{\"wait\": {{\"frames\": 100}}}}\n\
             \x20   {{\"render\": {{\"frames\": 44100}}}}\n\n\
             Examples:\n\
             \x20 opn2-render patch.json                    # Render with defaults\n\
             \x20 opn2-render --backend modeled patch.json  # Use the softsynth\n"
        );
    }
}
