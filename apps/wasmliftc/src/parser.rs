//! Command line argument parsing for the wasmlift translator.
//!
//! This module defines the CLI interface using `clap`. The `Cli` struct
//! captures all command line flags and arguments passed to the `wasmliftc`
//! binary.

use clap::Parser;

/// Command line interface definition for the wasmlift translator.
///
/// `wasmliftc` takes a single `.wasm` module image, decodes and validates it
/// per the WebAssembly MVP rules, and translates it into an equivalent
/// JavaScript module factory.
///
/// ## Output Flags
///
/// - `-o`: write the translated JavaScript to `out/<stem>.js`
/// - `--name`: label the emitted wrapper function
///
/// Without `-o` the translation still runs in full (useful as a validator)
/// and only a diagnostic line is printed.
///
/// ## Examples
///
/// Validate only:
/// ```bash
/// wasmliftc module.wasm
/// ```
///
/// Translate and write the JavaScript artifact:
/// ```bash
/// wasmliftc module.wasm -o --name my_module
/// ```
#[derive(Parser)]
#[command(
    name = "wasmliftc",
    author,
    version,
    about = "wasmlift WASM-to-JavaScript translator CLI (wasmliftc)",
    long_about = "The 'wasmliftc' command decodes, validates, and translates a single WebAssembly MVP \
module image into a JavaScript module factory. With -o the emitted JavaScript is written under out/."
)]
pub(crate) struct Cli {
    /// Path to the `.wasm` module image to translate.
    pub(crate) path: std::path::PathBuf,

    /// Write the translated JavaScript to `out/<stem>.js`.
    ///
    /// The output directory is created relative to the current working
    /// directory if it does not exist.
    #[clap(short = 'o', action = clap::ArgAction::SetTrue)]
    pub(crate) generate_js_output: bool,

    /// Name for the emitted wrapper function.
    ///
    /// Defaults to the input file stem. The name appears in the emitted
    /// `function <name>(ambient, stdlib, imports)` header and is purely a
    /// debugging aid.
    #[clap(long = "name")]
    pub(crate) name: Option<String>,
}
