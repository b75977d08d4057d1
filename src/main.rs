use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tdfa::{Builder, ExecutorType};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tdfa_regex")]
#[command(version)]
#[command(about = "Compile a regular expression to a tagged DFA", long_about = None)]
#[command(group(ArgGroup::new("output").multiple(false)))]
struct Cli {
    /// Only match at the start of the input
    #[arg(short, long)]
    anchored: bool,

    /// Print the automaton
    #[arg(long, group = "output")]
    dump: bool,

    /// Print the automaton with the kernel of every state
    #[arg(long, group = "output")]
    kernels: bool,

    /// Print the automaton as JSON
    #[arg(long, group = "output")]
    json: bool,

    /// Print the C matcher
    #[arg(long, group = "output")]
    emit: bool,

    /// Trace the construction on stderr
    #[arg(long)]
    debug: bool,

    /// Pattern to compile
    pattern: String,

    /// Input to match against the pattern
    input: Option<String>,
}

fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let re = Builder::new(&args.pattern)
        .anchored(args.anchored)
        .build()
        .with_context(|| format!("failed to compile {:?}", args.pattern))?;

    if args.dump {
        print!("{}", re.dfa());
    } else if args.kernels {
        print!("{}", re.dfa().dump_kernels());
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(re.dfa())?);
    } else if args.emit {
        print!("{}", re.emit_c());
    }

    if let Some(input) = args.input {
        let m = re.exec(input.as_bytes(), ExecutorType::Dfa);
        if !m.is_success() {
            println!("no match");
            return Ok(());
        }
        for i in 0..re.captures_len() {
            match m.group(i) {
                Some(r) => println!(
                    "{}: {}..{} {:?}",
                    i,
                    r.start,
                    r.end,
                    String::from_utf8_lossy(&input.as_bytes()[r.clone()])
                ),
                None => println!("{}: unmatched", i),
            }
        }
    }
    Ok(())
}
