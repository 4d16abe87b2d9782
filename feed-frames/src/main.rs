use feed_frames::{Frame, LineStream};
use serde::Serialize;
use std::env;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process;

const READ_CHUNK: usize = 8 * 1024;

fn main() {
    if let Err(err) = run() {
        eprintln!("{}: {err}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let input = match args.next() {
        Some(flag) if is_help_flag(&flag) => {
            print_help(&program);
            return Ok(());
        }
        Some(flag) if is_version_flag(&flag) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(path) if path == "-" => Input::Stdin,
        Some(path) => Input::File(path),
        None => Input::Stdin,
    };

    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {extra}\n{}", usage(&program)));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let residual = match input {
        Input::Stdin => scan(io::stdin().lock(), &mut out)?,
        Input::File(path) => {
            let file =
                File::open(&path).map_err(|err| format!("failed to open {path}: {err}"))?;
            scan(file, &mut out)?
        }
    };
    out.flush()
        .map_err(|err| format!("failed to write output: {err}"))?;

    if let Some(residual) = residual {
        eprintln!(
            "{}: discarded {} bytes of unterminated input",
            env!("CARGO_PKG_NAME"),
            residual.len()
        );
    }
    Ok(())
}

enum Input {
    Stdin,
    File(String),
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    line: usize,
    #[serde(flatten)]
    frame: Frame<'a>,
}

/// Writes one JSON object per non-blank line and returns the unterminated tail.
fn scan<R: Read, W: Write>(mut reader: R, out: &mut W) -> Result<Option<String>, String> {
    let mut stream = LineStream::new();
    let mut line_no = 0usize;
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|err| format!("failed to read input: {err}"))?;
        if read == 0 {
            break;
        }
        for line in stream.write(&buf[..read]) {
            line_no += 1;
            let frame = Frame::classify(&line);
            if frame == Frame::Blank {
                continue;
            }
            let record = FrameRecord {
                line: line_no,
                frame,
            };
            serde_json::to_writer(&mut *out, &record)
                .map_err(|err| format!("failed to serialize JSON: {err}"))?;
            writeln!(out).map_err(|err| format!("failed to write output: {err}"))?;
        }
    }

    Ok(stream.finish())
}

fn is_help_flag(arg: &str) -> bool {
    arg == "-h" || arg == "--help"
}

fn is_version_flag(arg: &str) -> bool {
    arg == "-V" || arg == "--version"
}

fn usage(program: &str) -> String {
    format!("Usage: {program} [FILE|-]")
}

fn print_help(program: &str) {
    println!("{}", usage(program));
    println!();
    println!("Reads a captured event feed and prints each complete frame as a JSON line.");
    println!("If FILE is omitted or '-', reads from stdin.");
    println!("An unterminated final line is reported on stderr and left out.");
}
