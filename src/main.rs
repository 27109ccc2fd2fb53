use clap::{Parser as ClapParser, Subcommand};
use futures::executor::block_on;
use rexl_lang::output::{from_json, to_json_pretty, to_json_string};
use rexl_lang::{Rexl, ValidateOptions, Value};
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "rexl")]
#[command(about = "Rexl - An embeddable expression language evaluated against JSON contexts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression against a JSON context
    Eval {
        /// The expression to evaluate
        expression: String,

        /// JSON context (reads from stdin if not provided)
        #[arg(short, long)]
        context: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Validate an expression without evaluating it
    Check {
        /// The expression to validate
        expression: String,

        /// JSON context to check property access against
        #[arg(short, long)]
        context: Option<String>,

        /// Include warnings in the report
        #[arg(short, long)]
        warnings: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Eval {
            expression,
            context,
            pretty,
        } => run_eval(expression, context, pretty),
        Commands::Check {
            expression,
            context,
            warnings,
        } => run_check(expression, context, warnings),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_eval(expression: String, context: Option<String>, pretty: bool) -> Result<(), String> {
    let context = read_context(context)?;
    let rexl = Rexl::new();
    let value = block_on(rexl.eval(&expression, &context)).map_err(|e| e.to_string())?;
    let rendered = if pretty {
        to_json_pretty(&value)
    } else {
        to_json_string(&value)
    };
    println!("{}", rendered);
    Ok(())
}

fn run_check(
    expression: String,
    context: Option<String>,
    warnings: bool,
) -> Result<(), String> {
    let context = match context {
        Some(_) => Some(read_context(context)?),
        None => None,
    };
    let rexl = Rexl::new();
    let options = ValidateOptions {
        allow_undefined_context: context.is_none(),
        include_warnings: warnings,
        ..ValidateOptions::default()
    };
    let result = rexl.validate(&expression, context.as_ref(), &options);
    for issue in &result.issues {
        match issue.position {
            Some(pos) => println!("[{}] {} (at {})", issue.code, issue.message, pos),
            None => println!("[{}] {}", issue.code, issue.message),
        }
    }
    if result.valid {
        println!("Expression is valid");
        Ok(())
    } else {
        Err("Expression is invalid".to_string())
    }
}

/// The JSON context: the given string, piped stdin, or null for neither.
fn read_context(context: Option<String>) -> Result<Value, String> {
    let text = match context {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| e.to_string())?;
            if buffer.trim().is_empty() {
                None
            } else {
                Some(buffer)
            }
        }
        None => None,
    };
    match text {
        Some(text) => {
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| format!("Invalid JSON context: {}", e))?;
            Ok(from_json(&json))
        }
        None => Ok(Value::Null),
    }
}
