use std::io::{self, IsTerminal, Read};

use sc_core::config::Config;
use sc_core::logging;
use sc_core::repl::{build_client, ctrl_c, run_once, run_repl};
use tokio::io::BufReader;

fn print_help() {
    println!("streamchat — streaming chat client for OpenAI-compatible APIs");
    println!();
    println!("Usage:");
    println!("  streamchat                    Interactive chat");
    println!("  streamchat \"prompt\"           Answer one prompt and exit");
    println!("  echo \"prompt\" | streamchat    One prompt via stdin pipe");
    println!();
    println!("Options:");
    println!("  --mock        Use a canned offline reply instead of the network");
    println!("  --version     Print version");
    println!("  --help        Print this help");
    println!();
    println!("In chat: /reset clears history, /quit exits.");
    println!("Ctrl-C stops the reply in progress; while waiting for input it exits.");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("streamchat {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let mock = args.iter().any(|a| a == "--mock");

    let config = Config::load_or_default();
    logging::init(&config.log.level);

    // One-shot mode: positional arg or piped stdin
    let non_flag_args: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
    let stdin_is_pipe = !io::stdin().is_terminal();

    let prompt = if let Some(arg) = non_flag_args.first() {
        Some((*arg).clone())
    } else if stdin_is_pipe {
        let mut buf = String::new();
        if io::stdin().read_to_string(&mut buf).is_ok() && !buf.trim().is_empty() {
            Some(buf.trim().to_string())
        } else {
            None
        }
    } else {
        None
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    let client = {
        let _enter = runtime.enter();
        match build_client(&config, mock) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    };

    let mut out = io::stdout();
    let mut err = io::stderr();

    if let Some(prompt) = prompt {
        let code = runtime.block_on(run_once(&client, &config, &prompt, &mut out, &mut err));
        std::process::exit(code);
    }

    let input = BufReader::new(tokio::io::stdin());
    if let Err(e) = runtime.block_on(run_repl(&client, &config, input, &mut out, &mut err, ctrl_c)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
