#![warn(clippy::pedantic)]

//! # wasmlift CLI
//!
//! Command line interface for the wasmlift WASM-to-JavaScript translator.
//!
//! The binary reads a single `.wasm` module image, runs the full
//! decode/validate/translate pipeline, and optionally (`-o`) writes the
//! emitted JavaScript to an `out/` directory relative to the current working
//! directory.
//!
//! ## Exit codes
//! * 0 – success.
//! * 1 – usage / IO / decode / validate failure.
//!
//! ## Example
//! ```bash
//! wasmliftc module.wasm -o --name my_module
//! ```
//!
//! ## Tests
//! Integration tests exercise flag validation and the happy path pipeline.

mod parser;
use clap::Parser;
use parser::Cli;
use std::{fs, path::PathBuf, process};
use wasmlift_translate::translate_module_named;

/// Entry point for the CLI executable.
///
/// Responsibilities:
/// * Parse flags.
/// * Validate that the input path exists.
/// * Run the translation pipeline.
/// * Optionally write the emitted JavaScript when `-o` is set.
///
/// On any failure a diagnostic is printed to stderr and the process exits
/// with code `1`.
fn main() {
    let args = Cli::parse();
    if !args.path.exists() {
        eprintln!("Error: path not found");
        process::exit(1);
    }

    let bytes = match fs::read(&args.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading module image: {e}");
            process::exit(1);
        }
    };

    let source_stem = args
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let wrapper_name = args.name.unwrap_or_else(|| source_stem.clone());

    let js = match translate_module_named(&wrapper_name, &bytes) {
        Ok(js) => js,
        Err(e) => {
            eprintln!("Translation failed: {e}");
            process::exit(1);
        }
    };
    println!("Translated: {}", args.path.display());

    if args.generate_js_output {
        let output_path = PathBuf::from("out");
        if let Err(e) = fs::create_dir_all(&output_path) {
            eprintln!("Failed to create output directory: {e}");
            process::exit(1);
        }
        let js_file_path = output_path.join(format!("{source_stem}.js"));
        if let Err(e) = fs::write(&js_file_path, &js) {
            eprintln!("Failed to write JS file: {e}");
            process::exit(1);
        }
        println!("JS generated at: {}", js_file_path.to_string_lossy());
    }
}
