// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::io::{self, Write};
use std::os::unix::io::{AsFd, AsRawFd};

use baudsim::config::Config;
use baudsim::forwarder::InputForwarder;
use baudsim::io::pty::{NixPty, PtyConfig};
use baudsim::io::tty::{self, RawModeGuard};
use baudsim::io::{Dispatcher, EventSource};
use baudsim::pacer::{Pacer, RateSchedule};
use baudsim::session::{Session, SessionStatus, SourceRole};
use cli::CliArgs;

const DEFAULT_PTY_COLS: u16 = 80;
const DEFAULT_PTY_ROWS: u16 = 24;

fn main() -> Result<()> {
    // stderr shares the terminal with paced output, so stay quiet by default.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_micros()
        .init();

    let args = CliArgs::parse();
    run(args)
}

fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(shell) = args.shell {
        config.shell.program = shell;
    }

    let schedule = RateSchedule::new(args.baud, &config.line)?;
    let escape = config.session.escape_byte()?;
    info!(
        "{} baud: {} bytes every {} ms",
        schedule.bits_per_second(),
        schedule.emission_budget(),
        schedule.tick_interval_ms()
    );

    let mut stdout = io::stdout();
    write!(stdout, "Escape character is: {}\r\n", escape as char)
        .and_then(|_| write!(stdout, "{}\r\n", schedule))
        .and_then(|_| stdout.flush())
        .context("Failed to write startup banner")?;

    let stdin = io::stdin();
    let (cols, rows) = tty::terminal_size(stdin.as_raw_fd()).unwrap_or_else(|e| {
        debug!("Could not read terminal size ({}), using defaults", e);
        (DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS)
    });

    let program = config.shell.program.to_string_lossy().into_owned();
    let shell_args: Vec<&str> = config.shell.args.iter().map(String::as_str).collect();
    let pty = NixPty::spawn_with_config(&PtyConfig {
        command_executable: &program,
        args: &shell_args,
        initial_cols: cols,
        initial_rows: rows,
    })
    .with_context(|| format!("forkpty: failed to start {}", program))?;
    info!("Spawned {} as PID {}", program, pty.child_pid());

    let _raw_mode = match RawModeGuard::enable(stdin.as_raw_fd()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("{:#}. Proceeding without raw mode.", e);
            None
        }
    };

    let mut dispatcher: Dispatcher<SourceRole> =
        Dispatcher::new().context("event_create: failed to create event dispatcher")?;

    // The dispatcher closes a failed read source's descriptor, so it gets
    // duplicates and the originals stay usable for the tty and for writing.
    let keyboard_fd = stdin
        .as_fd()
        .try_clone_to_owned()
        .context("Failed to duplicate stdin")?;
    dispatcher
        .register(EventSource::read_fd(
            keyboard_fd,
            SourceRole::Keyboard(InputForwarder::new(escape)),
        ))
        .context("event_add_evsrc: keyboard")?;
    dispatcher
        .register(EventSource::read_fd(pty.try_clone_fd()?, SourceRole::PtyOutput))
        .context("event_add_evsrc: pty")?;
    dispatcher
        .register(EventSource::timer(
            schedule.tick_interval(),
            SourceRole::FrameTick,
        ))
        .context("event_add_evsrc: timer")?;

    let pacer = Pacer::with_sizes(
        schedule,
        config.session.initial_buffer_capacity,
        config.session.read_chunk_size,
    );
    let mut session = Session::new(pacer, pty, stdout);

    info!("Starting event loop...");
    loop {
        dispatcher
            .dispatch_once(&mut session)
            .context("event_dispatch")?;
        match session.poll_status() {
            Ok(SessionStatus::Running) => {}
            Ok(SessionStatus::Shutdown) => {
                info!("Session finished.");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                return Err(e).context("event_dispatch: display lost");
            }
        }
    }
}
