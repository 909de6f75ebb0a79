use clap::Parser as ClapParser;
use std::io::{self, BufRead};

use tabcalc::{CellValue, EnvBinding, Expression, MapBinding, SymbolBinding};

#[derive(ClapParser)]
#[command(name = "tabcalc")]
#[command(about = "Evaluate infix expressions against named variables")]
#[command(version)]
struct Cli {
    /// Expressions to evaluate (read one per line from stdin if omitted)
    exprs: Vec<String>,

    /// Bind variables from a JSON object, e.g. '{"rate": 1.2, "unit": "kg"}'
    /// (without this, variables bind to the process environment)
    #[arg(short, long)]
    vars: Option<String>,

    /// Print the compiled tree before each result
    #[arg(short, long)]
    tree: bool,

    /// Emit results as JSON, one object per expression
    #[arg(short, long)]
    json: bool,
}

/// Errors that can occur around the evaluation loop itself.
#[derive(Debug)]
enum CliError {
    /// IO error while reading stdin
    Io(io::Error),
    /// --vars is not valid JSON
    Json(serde_json::Error),
    /// --vars is valid JSON but not an object of scalars
    VarsNotObject,
    /// A --vars entry has a non-scalar value
    VarsNotScalar(String),
    /// No expressions given and stdin is a terminal
    NoInput,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Json(e) => write!(f, "Invalid JSON in --vars: {}", e),
            CliError::VarsNotObject => write!(f, "--vars must be a JSON object"),
            CliError::VarsNotScalar(name) => {
                write!(f, "--vars entry '{}' must be a number, string, bool, or null", name)
            }
            CliError::NoInput => {
                write!(f, "No expressions given. Pass them as arguments or pipe one per line.")
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(e) => Some(e),
            CliError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    let mut binding: Box<dyn SymbolBinding> = match &cli.vars {
        Some(text) => Box::new(binding_from_json(text)?),
        None => Box::new(EnvBinding),
    };

    let exprs = if !cli.exprs.is_empty() {
        cli.exprs
    } else if !atty::is(atty::Stream::Stdin) {
        let mut lines = Vec::new();
        for line in io::stdin().lock().lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    } else {
        return Err(CliError::NoInput);
    };

    let mut failed = false;
    for text in &exprs {
        let mut expr = match Expression::compile(text) {
            Ok(expr) => expr,
            Err(e) => {
                eprintln!("{}", e);
                failed = true;
                continue;
            }
        };

        if cli.tree {
            eprint!("{}", expr.render_tree());
        }

        let value = expr.evaluate(binding.as_mut());
        if cli.json {
            let value = match &value {
                CellValue::Number(n) => serde_json::json!(n),
                CellValue::Text(s) => serde_json::json!(s),
            };
            println!("{}", serde_json::json!({ "expression": text, "value": value }));
        } else {
            println!("{} = {}", text, value);
        }
    }

    Ok(if failed { 1 } else { 0 })
}

fn binding_from_json(text: &str) -> Result<MapBinding, CliError> {
    let parsed: serde_json::Value = serde_json::from_str(text)?;
    let serde_json::Value::Object(map) = parsed else {
        return Err(CliError::VarsNotObject);
    };

    let mut binding = MapBinding::new();
    for (name, value) in map {
        let cell = match value {
            serde_json::Value::Number(n) => CellValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => CellValue::Text(s),
            serde_json::Value::Bool(b) => CellValue::Number(if b { 1.0 } else { 0.0 }),
            serde_json::Value::Null => CellValue::Number(0.0),
            _ => return Err(CliError::VarsNotScalar(name)),
        };
        binding.define(&name, cell);
    }
    Ok(binding)
}
