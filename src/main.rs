use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;
use rand::SeedableRng;

use ext_sort_stepper::buffer::block_size_for_memory;
use ext_sort_stepper::{data, record};
use ext_sort_stepper::{EventSink, ExecutionState, SortConfig, SortController, SortEvent, SortStats, TraceWriter};

fn main() {
    let arg_parser = build_app().get_matches();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    match arg_parser.subcommand() {
        Some(("generate", args)) => generate(args),
        Some(("sort", args)) => sort(args),
        _ => unreachable!("subcommand is required"),
    }
}

fn generate(args: &clap::ArgMatches) {
    let output = args.value_of("output").expect("value is required");
    let count: u64 = args.value_of_t_or_exit("count");

    let result = if args.is_present("seed") {
        let seed: u64 = args.value_of_t_or_exit("seed");
        fs::File::create(output).and_then(|file| {
            data::generate_data_with(
                io::BufWriter::new(file),
                count,
                &mut rand::rngs::StdRng::seed_from_u64(seed),
            )
        })
        .map(|()| log::info!("Generated {} records in {} (seed {})", count, output, seed))
    } else {
        data::generate_data_observed(path::Path::new(output), count, &mut |event: SortEvent| log_event(&event))
    };

    if let Err(err) = result {
        log::error!("data generation error: {}", err);
        process::exit(1);
    }
}

fn sort(args: &clap::ArgMatches) {
    let input = args.value_of("input").expect("value is required");
    let output = args.value_of("output").expect("value is required");
    let tmp_dir: Option<&str> = args.value_of("tmp_dir");
    let delay = args.value_of("delay").expect("value has a default");
    let delay = parse_delay(delay).expect("value is pre-validated");

    let block_size = if args.is_present("block_memory") {
        let block_memory = args.value_of("block_memory").expect("value is required");
        block_size_for_memory(block_memory.parse::<ByteSize>().expect("value is pre-validated").as_u64())
    } else {
        args.value_of_t_or_exit("block_size")
    };

    let mut config = SortConfig::new(block_size)
        .with_delay(delay)
        .paused(args.is_present("paused"));
    if let Some(tmp_dir) = tmp_dir {
        config = config.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let mut trace = match args.value_of("trace") {
        Some(trace) => match fs::File::create(trace) {
            Ok(file) => Some(TraceWriter::new(io::BufWriter::new(file))),
            Err(err) => {
                log::error!("trace file creation error: {}", err);
                process::exit(1);
            }
        },
        None => None,
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller = SortController::new();
    if let Err(err) = controller.start(input, output, config, tx) {
        log::error!("sort starting error: {}", err);
        process::exit(1);
    }

    if args.is_present("interactive") {
        if let Some(state) = controller.state() {
            thread::spawn(move || control_loop(state));
        }
    }

    for event in rx.iter() {
        log_event(&event);
        if let Some(trace) = trace.as_mut() {
            trace.emit(event);
        }
    }

    let stats = match controller.wait() {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    if let Some(trace) = trace {
        if let Err(err) = trace.finish() {
            log::error!("trace flushing error: {}", err);
        }
    }

    if args.is_present("verify") {
        verify(input, output, stats);
    }
}

fn log_event(event: &SortEvent) {
    match event {
        SortEvent::Progress { message } => log::info!("{}", message),
        SortEvent::RunCreated { run_id, values } => log::debug!("run {} created ({} records)", run_id, values.len()),
        SortEvent::MergeStep { value, run_id } => log::debug!("{:.4} <- run {}", value, run_id),
    }
}

fn verify(input: &str, output: &str, stats: SortStats) {
    let expected = match data::record_count(path::Path::new(input)) {
        Ok(count) => count,
        Err(err) => {
            log::error!("input file reading error: {}", err);
            process::exit(1);
        }
    };
    let values = match data::read_values(path::Path::new(output)) {
        Ok(values) => values,
        Err(err) => {
            log::error!("output file reading error: {}", err);
            process::exit(1);
        }
    };

    if values.len() as u64 != expected || stats.records != expected {
        log::error!("verification failed: {} records expected, {} found", expected, values.len());
        process::exit(1);
    }
    if let Some(pos) = values.windows(2).position(|pair| record::Record(pair[0]) > record::Record(pair[1])) {
        log::error!("verification failed: records {} and {} are out of order", pos, pos + 1);
        process::exit(1);
    }

    log::info!("verification passed ({} records)", expected);
}

/// Reads control commands from stdin: `p`ause, `r`esume, `s`tep, `d <secs>` delay, `c`ancel.
fn control_loop(state: Arc<ExecutionState>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("control input error: {}", err);
                return;
            }
        };

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("p"), _) => state.pause(),
            (Some("r"), _) => state.resume(),
            (Some("s"), _) => state.step(),
            (Some("c"), _) => state.cancel(),
            (Some("d"), Some(delay)) => match parse_delay(delay) {
                Ok(delay) => state.set_delay(delay),
                Err(err) => log::warn!("{}", err),
            },
            (None, _) => {}
            (Some(command), _) => log::warn!("unknown command: {}", command),
        }
        log::info!("sort is {}", state.status());
    }
}

/// Parses a non-negative number of seconds into a delay.
fn parse_delay(value: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<f64>()
        .map_err(|err| format!("Delay format incorrect: {}", err))?;

    Duration::try_from_secs_f64(seconds).map_err(|err| format!("Delay {} is not usable: {}", value, err))
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_app() -> clap::App<'static> {
    clap::App::new("ext-sort-stepper")
        .about("observable external sorter of binary f64 files")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .global(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .subcommand(
            clap::App::new("generate")
                .about("generates a file of random records")
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("file to be generated")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("count")
                        .short('n')
                        .long("count")
                        .help("number of records")
                        .required(true)
                        .takes_value(true)
                        .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|err| err.to_string())),
                )
                .arg(
                    clap::Arg::new("seed")
                        .long("seed")
                        .help("random generator seed")
                        .takes_value(true)
                        .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|err| err.to_string())),
                ),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sorts a file of records")
                .arg(
                    clap::Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("file to be sorted")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("result file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("block_size")
                        .short('c')
                        .long("block-size")
                        .help("maximum number of records per run")
                        .takes_value(true)
                        .default_value("10")
                        .validator(|v| match v.parse::<usize>() {
                            Ok(size) if size >= 1 => Ok(()),
                            Ok(_) => Err("Block size must be at least 1".to_string()),
                            Err(err) => Err(format!("Block size format incorrect: {}", err)),
                        }),
                )
                .arg(
                    clap::Arg::new("block_memory")
                        .short('m')
                        .long("block-memory")
                        .help("memory per run, overrides the block size")
                        .takes_value(true)
                        .conflicts_with("block_size")
                        .validator(|v| match v.parse::<ByteSize>() {
                            Ok(_) => Ok(()),
                            Err(err) => Err(format!("Block memory format incorrect: {}", err)),
                        }),
                )
                .arg(
                    clap::Arg::new("delay")
                        .long("delay")
                        .help("delay in seconds applied to every merge step")
                        .takes_value(true)
                        .default_value("0")
                        .validator(|v| parse_delay(v).map(|_| ())),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary data")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("trace")
                        .short('t')
                        .long("trace")
                        .help("file to record sort events to (MessagePack)")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("paused")
                        .long("paused")
                        .help("start the merge paused")
                        .requires("interactive"),
                )
                .arg(
                    clap::Arg::new("interactive")
                        .long("interactive")
                        .help("read p/r/s/d <secs>/c control commands from stdin"),
                )
                .arg(clap::Arg::new("verify").long("verify").help("check the output after sorting")),
        )
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
