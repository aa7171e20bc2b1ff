use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::Parser;

use tap::block::{analyze, CountdownKind, TapAnalysis};
use tap::container::{read_tap_file, TapVersion};
use tap::encode::encode_prg_to_tap;
use tap::export::{recover_files, PrgFile};
use tap::header::KernalHeader;
use tap::wave::{encode_prg_to_wav, DEFAULT_SAMPLE_RATE};

#[derive(Parser)]
#[command(
    name = "tap-tool",
    about = "Inspect C64 .tap cassette images and convert .prg programs to tape",
    disable_help_flag = true
)]
struct Args {
    /// Analyze a .tap file: blocks, checksums, countdowns, headers
    #[arg(short = 'a', long = "analyze", value_name = "TAP")]
    analyze: Option<PathBuf>,

    /// Analyze a .tap file and export every program it carries as .prg
    #[arg(short = 'e', long = "export", value_name = "TAP")]
    export: Option<PathBuf>,

    /// Convert a .prg to a .tap file
    #[arg(long = "conv2tap", num_args = 2, value_names = ["PRG", "TAP"])]
    conv2tap: Option<Vec<PathBuf>>,

    /// Convert a .prg to a .wav file
    #[arg(long = "conv2wav", num_args = 2, value_names = ["PRG", "WAV"])]
    conv2wav: Option<Vec<PathBuf>>,

    /// TAP container version to write (0 or 1)
    #[arg(long = "tap-version", default_value_t = 1, value_name = "VERSION")]
    tap_version: u8,

    /// WAVE sample rate in Hz
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE, value_name = "HZ")]
    sample_rate: u32,

    /// Output analysis as JSON
    #[arg(long)]
    json: bool,

    /// Print the JSON schema for the analysis output and exit
    #[arg(long)]
    schema: bool,

    /// Display version and quit
    #[arg(long)]
    version: bool,

    /// Show this help text
    #[arg(short = '?', long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() {
    // Reset SIGPIPE to default so piped output (e.g. head/tail) exits cleanly
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.version {
        tap::version::print_cli_version_banner(
            "C64 TAP Tool",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return Ok(());
    }

    if args.schema {
        let schema = schemars::schema_for!(TapAnalysis);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut ran_command = false;

    if let Some(path) = &args.analyze {
        analyze_command(path, args.json)?;
        ran_command = true;
    }

    if let Some(path) = &args.export {
        export_command(path, args.json)?;
        ran_command = true;
    }

    if let Some(paths) = &args.conv2tap {
        let version = TapVersion::from_byte(args.tap_version)?;
        conv2tap_command(&paths[0], &paths[1], version)?;
        ran_command = true;
    }

    if let Some(paths) = &args.conv2wav {
        conv2wav_command(&paths[0], &paths[1], args.sample_rate)?;
        ran_command = true;
    }

    if !ran_command {
        return Err("no command given; \"tap-tool --help\" provides more information".into());
    }

    Ok(())
}

fn analyze_command(path: &Path, json: bool) -> Result<TapAnalysis, Box<dyn std::error::Error>> {
    let image = read_tap_file(path)?;
    let analysis = analyze(&image);

    if json {
        println!("{}", serde_json::to_string(&analysis)?);
        return Ok(analysis);
    }

    log::info!("Analyzing TAP file: {}", path.display());
    if image.declared_len as usize != image.payload_len() {
        log::warn!(
            "header declares {} payload byte(s) but the file carries {}",
            image.declared_len,
            image.payload_len()
        );
    }

    println!("TAP version: {}", analysis.version);
    println!("Block count: {}", analysis.blocks.len());

    for (i, block) in analysis.blocks.iter().enumerate() {
        let crc = if block.checksum_ok { "OK" } else { "Error" };
        let countdown = match block.countdown {
            CountdownKind::Invalid => "Error",
            _ => "OK",
        };
        print!(
            "Block {} size: {} [CRC: {}] - [Countdown: {}]",
            i,
            block.len(),
            crc,
            countdown
        );
        if block.parity_errors > 0 {
            print!(" - [Parity errors: {}]", block.parity_errors);
        }
        println!();
    }

    for (i, block) in analysis.blocks.iter().enumerate() {
        let Some(header) = KernalHeader::from_block(block) else {
            continue;
        };
        let backup = if block.countdown == CountdownKind::Backup {
            " [BACKUP]"
        } else {
            ""
        };
        println!("Block {}: Kernal Header Block{}", i, backup);
        println!("\tType:          {:02x} ({})", header.header_type, header.type_name());
        println!("\tStart address: {:04x}", header.load_address);
        println!("\tEnd address:   {:04x}", header.end_address);
        println!("\tFilename:      {}", header.display_name());
    }

    for issue in analysis.issues() {
        log::warn!("[Error] {issue}");
    }

    Ok(analysis)
}

/// Map a displayed filename onto something safe to create in the current
/// directory.
fn export_file_name(header: &KernalHeader) -> String {
    let name: String = header
        .display_name()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    if name.is_empty() {
        "untitled".to_string()
    } else {
        name
    }
}

fn export_command(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = analyze_command(path, json)?;
    let recovery = recover_files(&analysis);

    for issue in &recovery.issues {
        log::warn!("[Error] {issue}");
    }

    for file in &recovery.files {
        if file.used_backup_header {
            log::warn!(
                "block {}: header recovered from its backup copy",
                file.block_index
            );
        }
        if file.used_backup_data {
            log::warn!(
                "block {}: data recovered from its backup copy",
                file.block_index
            );
        }
        if file.end_address_mismatch {
            log::warn!(
                "block {}: header end address {:04x} disagrees with data length {}",
                file.block_index,
                file.header.end_address,
                file.prg.bytes.len()
            );
        }

        let out = PathBuf::from(format!("{}.prg", export_file_name(&file.header)));
        log::info!("Exporting block {}: {}", file.block_index, out.display());
        fs::write(&out, file.prg.to_bytes())
            .map_err(|e| format!("Writing '{}': {}", out.display(), e))?;
    }

    log::info!("Exported {} file(s)", recovery.files.len());
    Ok(())
}

fn read_prg(path: &Path) -> Result<PrgFile, Box<dyn std::error::Error>> {
    let raw = fs::read(path).map_err(|e| format!("Opening '{}': {}", path.display(), e))?;
    Ok(PrgFile::from_bytes(&raw)?)
}

fn conv2tap_command(
    prg_path: &Path,
    tap_path: &Path,
    version: TapVersion,
) -> Result<(), Box<dyn std::error::Error>> {
    let prg = read_prg(prg_path)?;
    log::info!(
        "Converting {} ({} byte(s) at {:04x}) to TAP",
        prg_path.display(),
        prg.bytes.len(),
        prg.load_address
    );

    let file = File::create(tap_path).map_err(|e| {
        format!("Creating '{}': {}", tap_path.display(), e)
    })?;
    match encode_prg_to_tap(&prg, version, BufWriter::new(file)) {
        Ok(_) => {
            log::info!("Wrote {}", tap_path.display());
            Ok(())
        }
        Err(e) => {
            // Do not leave a half-written container behind
            let _ = fs::remove_file(tap_path);
            Err(format!("Writing '{}': {}", tap_path.display(), e).into())
        }
    }
}

fn conv2wav_command(
    prg_path: &Path,
    wav_path: &Path,
    sample_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let prg = read_prg(prg_path)?;
    log::info!(
        "Converting {} ({} byte(s) at {:04x}) to WAVE at {} Hz",
        prg_path.display(),
        prg.bytes.len(),
        prg.load_address,
        sample_rate
    );

    let file = File::create(wav_path).map_err(|e| {
        format!("Creating '{}': {}", wav_path.display(), e)
    })?;
    match encode_prg_to_wav(&prg, sample_rate, BufWriter::new(file)) {
        Ok(_) => {
            log::info!("Wrote {}", wav_path.display());
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(wav_path);
            Err(format!("Writing '{}': {}", wav_path.display(), e).into())
        }
    }
}
