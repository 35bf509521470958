use clap::Parser as ClapParser;
use clap::Subcommand;
use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
};

use bytecode::{Image, Literal, Rep};
use log::LevelFilter;

use vm::check::{self, CheckOptions, Toolchain};
use vm::{Runtime, VmConfig};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Maximum nesting of method calls before "stack level too deep"
    #[arg(long, global = true, help = "Limit on nested method calls")]
    max_call_depth: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute compiled .mrb images in order
    Run {
        #[arg(required = true, help = "The .mrb files to execute")]
        files: Vec<PathBuf>,
    },
    /// Print header, diagnostics and disassembly instead of executing
    Dump {
        #[arg(required = true, help = "The .mrb files to disassemble")]
        files: Vec<PathBuf>,
    },
    /// Compare against the reference toolchain on a directory of .rb cases
    Check {
        #[arg(help = "Directory holding the .rb cases")]
        dir: PathBuf,

        #[arg(long, help = "Only run cases whose name contains this")]
        filter: Option<String>,

        #[arg(long, default_value = "mrbc", help = "Reference compiler")]
        mrbc: PathBuf,

        #[arg(long, default_value = "mruby", help = "Reference interpreter")]
        mruby: PathBuf,

        #[arg(short, long, default_value_t = 4, help = "Worker threads")]
        jobs: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = VmConfig::default();
    if let Some(depth) = cli.max_call_depth {
        config.max_call_depth = depth;
    }
    if let Err(msg) = config.validate() {
        eprintln!("Error: invalid configuration: {msg}");
        process::exit(2);
    }

    match cli.command {
        Command::Run { files } => {
            for path in &files {
                let image = load_or_exit(path);
                if let Err(err) = run_file(&image, &config) {
                    eprintln!("Error running '{}': {}", path.display(), err);
                    process::exit(1);
                }
            }
        }
        Command::Dump { files } => {
            for path in &files {
                let image = load_or_exit(path);
                println!("== {} ==", path.display());
                dump_image(&image);
            }
        }
        Command::Check {
            dir,
            filter,
            mrbc,
            mruby,
            jobs,
        } => {
            let opts = CheckOptions {
                dir,
                filter,
                toolchain: Toolchain { mrbc, mruby },
                jobs,
                config,
            };
            let reports = match check::check(&opts) {
                Ok(reports) => reports,
                Err(err) => {
                    eprintln!(
                        "Error reading cases in '{}': {}",
                        opts.dir.display(),
                        err
                    );
                    process::exit(1);
                }
            };
            let failed = reports.iter().filter(|r| !r.passed()).count();
            for report in &reports {
                println!("{report}");
            }
            println!("{} passed, {} failed", reports.len() - failed, failed);
            if failed > 0 {
                process::exit(1);
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_or_exit(path: &Path) -> Image {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("Error reading file '{}': {}", path.display(), err);
            process::exit(1);
        }
    };
    match bytecode::load(&bytes) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("Error loading '{}': {}", path.display(), err);
            process::exit(1);
        }
    }
}

fn run_file(image: &Image, config: &VmConfig) -> vm::VmResult<()> {
    let mut rt = Runtime::with_config(io::stdout(), io::stderr(), config.clone());
    let result = rt.execute(image).map(|_| ());
    // whatever was printed before a failure still goes out
    rt.flush()?;
    result
}

fn dump_image(image: &Image) {
    println!(
        "RITE {}.{} compiler {} {} ({} bytes)",
        image.major,
        image.minor,
        String::from_utf8_lossy(&image.compiler),
        String::from_utf8_lossy(&image.compiler_version),
        image.total_size
    );
    for diagnostic in &image.diagnostics {
        println!("!! {diagnostic}");
    }
    for (idx, rep) in image.records.iter().enumerate() {
        println!("-- record {idx} --");
        dump_rep(rep, 0);
    }
}

fn dump_rep(rep: &Rep, indent: usize) {
    let pad = " ".repeat(indent);
    println!(
        "{pad}locals {} registers {} catch handlers {}",
        rep.local_count, rep.register_count, rep.catch_count
    );
    for (instr, offset) in rep.instructions.iter().zip(&rep.offsets) {
        println!("{pad}{offset:04} {instr}");
    }
    if !rep.literal_pool.is_empty() {
        println!("{pad}-- pool --");
        for (idx, literal) in rep.literal_pool.iter().enumerate() {
            match literal {
                Literal::String(s) => println!("{pad}[{idx}] {s:?}"),
            }
        }
    }
    if !rep.symbol_table.is_empty() {
        println!("{pad}-- symbols --");
        for (idx, sym) in rep.symbol_table.iter().enumerate() {
            println!("{pad}[{idx}] :{sym}");
        }
    }
    for (idx, child) in rep.children.iter().enumerate() {
        println!("{pad}  >> child {idx}");
        dump_rep(child, indent + 4);
    }
}
