use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use shared::{Config, FileStore, ServerEndpoint};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use studio_client::{
    ChannelId, CpalCaptureDevice, Notice, PlaybackEvent, RodioOutput, Session, SessionParts,
    SynthesisClient, TransportState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "voice-studio")]
#[command(about = "Record voice samples and generate speech in that voice")]
struct Args {
    #[arg(long, help = "Synthesis server URL (scheme and host)")]
    url: Option<String>,

    #[arg(short, long, help = "Synthesis server port")]
    port: Option<String>,

    #[arg(long, help = "Directory holding saved samples")]
    data_dir: Option<PathBuf>,

    #[arg(long, help = "Print input devices and exit")]
    list_devices: bool,

    #[arg(long, help = "Write the effective configuration to the config file and exit")]
    write_config: bool,
}

const HELP: &str = "\
commands:
  record                 start or stop recording a sample
  list                   show samples
  play <n>               play or pause sample n
  delete <n>             delete sample n
  generate <text>        generate speech for text
  preview <text>         generate and play a short preview
  result                 play or stop the generated speech
  export [dir]           save generated speech as generated-speech.wav
  speed|pitch|emphasis <v>
  server <url> <port>
  status
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(url) = args.url {
        config.server.url = url;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }

    if args.write_config {
        let path = config.save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    if args.list_devices {
        for name in CpalCaptureDevice::list_input_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    info!("Voice studio started");

    let output = RodioOutput::new().context("Failed to open audio output")?;
    let store = Arc::new(FileStore::new(config.data_dir()));
    let mut session = Session::start(SessionParts {
        capture: Box::new(CpalCaptureDevice::new(config.audio.device.clone())),
        output: Box::new(output),
        store,
        slot: config.storage.slot.clone(),
        synthesis: SynthesisClient::new(config.endpoint())?,
        settings: config.settings(),
    })
    .await;

    let mut notices = session.take_notices().context("Notice stream already taken")?;
    let mut playback_events = session.subscribe_playback();

    let (line_tx, mut lines) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("{}", HELP);
    print_samples(&session);

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if !handle_command(&mut session, line.trim()).await {
                    break;
                }
            }
            _ = ticker.tick() => session.tick(),
        }

        while let Ok(notice) = notices.try_recv() {
            match notice {
                Notice::Info(text) => println!("* {}", text),
                Notice::Error(text) => println!("! {}", text),
            }
        }
        while let Ok(event) = playback_events.try_recv() {
            if let PlaybackEvent::StateChanged { channel, source, state } = event {
                if state != TransportState::Playing || channel != ChannelId::Sample {
                    info!("{:?} {:?} -> {:?}", channel, source, state);
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

// Returns false when the session should end
async fn handle_command(session: &mut Session, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => {}
        "help" => println!("{}", HELP),
        "quit" | "exit" => return false,
        "record" => {
            // Failures arrive as notices
            let _ = session.toggle_recording();
        }
        "list" => print_samples(session),
        "play" => match sample_at(session, rest) {
            Some(id) => report(session.toggle_sample(id)),
            None => println!("! No sample '{}'", rest),
        },
        "delete" => match sample_at(session, rest) {
            Some(id) => report(session.delete_sample(id)),
            None => println!("! No sample '{}'", rest),
        },
        "generate" => {
            if let Ok(false) = session.request_generation(rest) {
                println!("! Still generating");
            }
        }
        "preview" => {
            if let Ok(false) = session.request_preview(rest) {
                println!("! Still previewing");
            }
        }
        "result" => report(session.toggle_generation()),
        "export" => {
            let dir = if rest.is_empty() { PathBuf::from(".") } else { PathBuf::from(rest) };
            match session.export_generation(&dir).await {
                Ok(path) => println!("* Saved {}", path.display()),
                Err(e) => println!("! {}", e),
            }
        }
        "speed" | "pitch" | "emphasis" => match rest.parse::<f32>() {
            Ok(value) => {
                let settings = session.settings();
                let settings = match command {
                    "speed" => settings.with_speed(value),
                    "pitch" => settings.with_pitch(value),
                    _ => settings.with_emphasis(value),
                };
                session.set_settings(settings);
                println!("* speed {}x, pitch {}x, emphasis {}x", settings.speed, settings.pitch, settings.emphasis);
            }
            Err(_) => println!("! Expected a number"),
        },
        "server" => match rest.split_once(' ') {
            Some((url, port)) => session.set_endpoint(ServerEndpoint::new(url.trim(), port.trim())),
            None => println!("! Usage: server <url> <port>"),
        },
        "status" => print_status(session),
        other => println!("! Unknown command '{}'", other),
    }
    true
}

fn report(result: shared::StudioResult<()>) {
    if let Err(e) = result {
        println!("! {}", e);
    }
}

fn sample_at(session: &Session, arg: &str) -> Option<Uuid> {
    let index = arg.parse::<usize>().ok()?.checked_sub(1)?;
    session.samples().get(index).map(|sample| sample.id)
}

fn print_samples(session: &Session) {
    let samples = session.samples();
    if samples.is_empty() {
        println!("No voice samples yet. Start by recording one!");
        return;
    }
    for (index, sample) in samples.iter().enumerate() {
        let marker = if session.is_sample_playing(sample.id) { ">" } else { " " };
        println!(
            "{} {:>2}. {}  {}s • {}",
            marker,
            index + 1,
            sample.name,
            sample.duration_seconds,
            sample.created_date
        );
    }
}

fn print_status(session: &Session) {
    let context = session.context();
    println!("server    {}", session.endpoint().origin());
    println!(
        "settings  speed {}x, pitch {}x, emphasis {}x",
        context.settings.speed, context.settings.pitch, context.settings.emphasis
    );
    println!(
        "flags     recording={} generating={} previewing={}",
        context.is_recording, context.is_generating, context.is_previewing
    );
    for channel in ChannelId::ALL {
        let status = session.channel(channel);
        println!(
            "{:<9} {:?} {:.1}/{:.1}s",
            format!("{:?}", channel).to_lowercase(),
            status.state,
            status.position_seconds,
            status.duration_seconds
        );
    }
    println!("generated {}", if session.generation().is_some() { "yes" } else { "no" });
}
