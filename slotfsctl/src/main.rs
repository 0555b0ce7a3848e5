use anyhow::Context;
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use slotfs::{BlockDevice, Config, FsImageDevice, Mode, SlotFs};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slotfsctl")]
#[command(about = "Inspect and edit slot file system images")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, default_value = "./slotfs.img")]
    image: String,

    /// JSON file holding {slot_count, start_address, end_address}
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    slots: usize,

    #[arg(long, default_value_t = 0)]
    start: u64,

    #[arg(long, default_value_t = 512 * 2048)]
    end: u64,

    #[arg(long)]
    page_blocks: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the image, formatting it if the configuration differs
    Init,
    /// Reset every slot to empty
    Format,
    Ls,
    /// Report slots with damaged metadata copies
    Check,
    Put { slot: usize, path: PathBuf },
    Get { slot: usize, path: Option<PathBuf> },
    Shell,
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Ls,
    Check,
    Format,
    Put(usize, PathBuf),
    Get(usize, Option<PathBuf>),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let image = std::env::var("SLOTFS_IMAGE").unwrap_or(cli.image.clone());
    let mut fs = open_fs(&cli, &image)?;

    match cli.command {
        Some(Commands::Init) => {
            println!(
                "{}: {} slots of {} bytes",
                image,
                fs.slot_count(),
                fs.layout().slot_size()
            );
        }
        Some(Commands::Format) => {
            fs.format()?;
            println!("Formatted {} slots", fs.slot_count());
        }
        Some(Commands::Ls) => list_slots(&mut fs)?,
        Some(Commands::Check) => {
            let damaged = check_slots(&mut fs)?;
            if damaged > 0 {
                anyhow::bail!("{} slot(s) need attention", damaged);
            }
        }
        Some(Commands::Put { slot, path }) => put_file(&mut fs, slot, &path)?,
        Some(Commands::Get { slot, path }) => get_file(&mut fs, slot, path.as_deref())?,
        Some(Commands::Shell) | None => start_interactive_shell(&mut fs, &image)?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {:?}", path))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {:?}", path))?
        }
        None => Config::new(cli.slots, cli.start, cli.end),
    };
    log::debug!("using {:?}", config);
    Ok(config)
}

// Only `init` and `format` take the layout from the flags; everything else
// reads the config block already on the image.
fn open_fs(cli: &Cli, image: &str) -> anyhow::Result<SlotFs<FsImageDevice>> {
    let config = load_config(cli)?;
    let mut fs = match cli.command {
        Some(Commands::Init | Commands::Format) => create(image, config)?,
        _ => attach(image, config.start_address)?,
    };
    if let Some(blocks) = cli.page_blocks {
        fs.set_page_blocks(blocks)?;
    }
    Ok(fs)
}

fn create(image: &str, config: Config) -> anyhow::Result<SlotFs<FsImageDevice>> {
    let device = FsImageDevice::open(image, config.end_address)
        .with_context(|| format!("opening image {}", image))?;
    let fs = SlotFs::init(device, config).with_context(|| format!("mounting {:?}", config))?;
    Ok(fs)
}

fn attach(image: &str, start_address: u64) -> anyhow::Result<SlotFs<FsImageDevice>> {
    let device = FsImageDevice::open_existing(image)
        .with_context(|| format!("opening image {}", image))?;
    let fs = SlotFs::mount(device, start_address).with_context(|| {
        format!(
            "no slot file system at {:#x} in {}, run 'init' first",
            start_address, image
        )
    })?;
    Ok(fs)
}

fn list_slots<D: BlockDevice>(fs: &mut SlotFs<D>) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for slot in 0..fs.slot_count() {
        let report = fs.inspect(slot)?;
        if !report.exists() {
            continue;
        }
        if let Some(md) = report.meta() {
            rows.push(vec![
                slot.to_string(),
                md.file_size.to_string(),
                md.revision.to_string(),
                format!("{:#x}", md.start_address),
            ]);
        }
    }
    if rows.is_empty() {
        println!("(no files)");
        return Ok(());
    }
    display_table(&["slot", "size", "revision", "address"], &rows);
    println!("\n({} files)", rows.len());
    Ok(())
}

fn check_slots<D: BlockDevice>(fs: &mut SlotFs<D>) -> anyhow::Result<usize> {
    let mut rows = Vec::new();
    let mut damaged = 0;
    for slot in 0..fs.slot_count() {
        let report = fs.inspect(slot)?;
        let state = if report.is_corrupt() {
            "corrupt"
        } else if report.is_degraded() {
            "degraded"
        } else {
            "ok"
        };
        if state != "ok" {
            damaged += 1;
        }
        let copy = |idx: usize| match report.copies[idx] {
            Some(md) => format!("rev {}", md.revision),
            None => "bad".to_string(),
        };
        rows.push(vec![slot.to_string(), state.to_string(), copy(0), copy(1)]);
    }
    display_table(&["slot", "state", "copy A", "copy B"], &rows);
    Ok(damaged)
}

fn put_file<D: BlockDevice>(fs: &mut SlotFs<D>, slot: usize, path: &Path) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let mut file = fs.open(slot, Mode::WriteCreate)?;
    let result = fs.write(&mut file, &data);
    if let Err(e) = fs.close(&mut file) {
        log::warn!("closing slot {} failed ({}), retrying", slot, e);
        fs.close(&mut file)
            .with_context(|| format!("slot {} is stuck open", slot))?;
    }
    let written = result.with_context(|| format!("writing {:?} to slot {}", path, slot))?;
    println!("✓ Wrote {} bytes to slot {}", written, slot);
    Ok(())
}

fn read_slot<D: BlockDevice>(fs: &mut SlotFs<D>, slot: usize) -> anyhow::Result<Vec<u8>> {
    let mut file = fs.open(slot, Mode::Read)?;
    let mut data = vec![0u8; fs.size(&file)? as usize];
    let outcome = fs.read(&mut file, &mut data);
    fs.close(&mut file)?;
    let outcome = outcome.with_context(|| format!("reading slot {}", slot))?;
    data.truncate(outcome.bytes);
    Ok(data)
}

fn get_file<D: BlockDevice>(
    fs: &mut SlotFs<D>,
    slot: usize,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    let data = read_slot(fs, slot)?;
    match path {
        Some(path) => {
            std::fs::write(path, &data).with_context(|| format!("writing {:?}", path))?;
            println!("✓ Read {} bytes from slot {}", data.len(), slot);
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn parse_shell_command(line: &str) -> anyhow::Result<ShellCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default().to_lowercase();
    let mut slot = || -> anyhow::Result<usize> {
        let raw = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} needs a slot number", verb))?;
        raw.parse()
            .with_context(|| format!("invalid slot number {:?}", raw))
    };
    let command = match verb.as_str() {
        "ls" => ShellCommand::Ls,
        "check" => ShellCommand::Check,
        "format" => ShellCommand::Format,
        "put" => {
            let slot = slot()?;
            let path = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("put needs a file path"))?;
            ShellCommand::Put(slot, PathBuf::from(path))
        }
        "get" | "cat" => {
            let slot = slot()?;
            ShellCommand::Get(slot, parts.next().map(PathBuf::from))
        }
        other => anyhow::bail!("unknown command {:?}, try 'help'", other),
    };
    Ok(command)
}

fn execute_shell_command<D: BlockDevice>(fs: &mut SlotFs<D>, line: &str) -> anyhow::Result<()> {
    match parse_shell_command(line)? {
        ShellCommand::Ls => list_slots(fs),
        ShellCommand::Check => check_slots(fs).map(|damaged| {
            println!("\n({} damaged)", damaged);
        }),
        ShellCommand::Format => {
            fs.format()?;
            println!("Formatted {} slots", fs.slot_count());
            Ok(())
        }
        ShellCommand::Put(slot, path) => put_file(fs, slot, &path),
        ShellCommand::Get(slot, path) => get_file(fs, slot, path.as_deref()),
    }
}

fn start_interactive_shell<D: BlockDevice>(fs: &mut SlotFs<D>, image: &str) -> anyhow::Result<()> {
    println!("SlotFS Interactive Shell");
    println!("Type 'help' for help, 'exit' or 'quit' to quit");
    println!("Image: {} ({} slots)\n", image, fs.slot_count());

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("slotfs> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match line.to_lowercase().as_str() {
                    "exit" | "quit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "help" => {
                        print_help();
                    }
                    "clear" | "cls" => {
                        clear_terminal();
                    }
                    _ => {
                        if let Err(e) = execute_shell_command(fs, line) {
                            println!("Error: {:#}", e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut column_widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            column_widths[i] = column_widths[i].max(cell.len());
        }
    }

    let pad = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&column_widths)
            .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut lines = vec![pad(headers.to_vec())];
    let separator: Vec<String> = column_widths
        .iter()
        .map(|&width| "-".repeat(width))
        .collect();
    lines.push(separator.join("-|-"));
    for row in rows {
        lines.push(pad(row.iter().map(String::as_str).collect()));
    }
    lines
}

fn display_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in format_table(headers, rows) {
        println!("{}", line);
    }
}

fn clear_terminal() {
    print!("\x1B[2J\x1B[1;1H");
    let _ = Write::flush(&mut std::io::stdout());
}

fn print_help() {
    println!("SlotFS Help:");
    println!("------------");
    println!();
    println!("  File Commands:");
    println!("    ls                  - List slots holding a file");
    println!("    check               - Show the state of both metadata copies");
    println!("    put <slot> <path>   - Store a local file in a slot");
    println!("    get <slot> [path]   - Copy a slot to a local file (or stdout)");
    println!("    cat <slot>          - Print a slot to stdout");
    println!("    format              - Reset every slot to empty");
    println!();
    println!("  Shell Commands:");
    println!("    help    - Show this help");
    println!("    clear   - Clear the terminal screen");
    println!("    cls     - Clear the terminal screen");
    println!("    exit    - Exit the shell");
    println!("    quit    - Exit the shell");
}
