//! Native voice demo client.
//!
//! Terminal stand-in for the browser widget: connects the default
//! microphone and speakers to a realtime session, prints turn-taking
//! transitions as they happen and renders a microphone level meter.
//! Ctrl+C hangs up.

use clap::Parser;
use tracing::info;
use voicebar_realtime::{Session, SessionCallbacks, TransportOptions};

#[derive(Parser, Debug)]
#[command(name = "voicebar-demo", about = "Talk to the voice assistant from the terminal")]
struct Args {
    /// Backend endpoint that mints ephemeral client secrets.
    #[arg(long, default_value = "http://localhost:3000/api/realtime-session")]
    token_endpoint: String,

    /// Assistant voice preset.
    #[arg(long, default_value = "verse")]
    voice: String,

    /// Optional system instructions for the assistant.
    #[arg(long)]
    instructions: Option<String>,
}

const METER_WIDTH: usize = 24;

fn render_meter(level: f32) {
    let filled = (level * METER_WIDTH as f32).round() as usize;
    let bar: String = (0..METER_WIDTH)
        .map(|i| if i < filled { '#' } else { '-' })
        .collect();
    eprint!("\rmic [{bar}] ");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    info!(endpoint = %args.token_endpoint, "starting voice demo");

    let callbacks = SessionCallbacks::new()
        .on_user_start_speaking(|| println!("\n[you] speaking..."))
        .on_user_stop_speaking(|| println!("\n[you] done"))
        .on_ai_start_speaking(|| println!("\n[assistant] responding..."))
        .on_ai_stop_speaking(|| println!("\n[assistant] done"))
        .on_audio_playback_start(|| println!("\n[assistant] audio playing"))
        .on_audio_playback_end(|| println!("\n[assistant] audio finished"))
        .on_audio_level(render_meter)
        .on_error(|message| eprintln!("\nsession error: {message} (press Ctrl+C to hang up)"));

    let options = TransportOptions {
        voice: args.voice,
        instructions: args.instructions,
        ..Default::default()
    };
    let mut session = Session::new(args.token_endpoint, options, callbacks);

    session.connect().await?;
    println!("Connected. Speak into the microphone; Ctrl+C to hang up.");

    tokio::signal::ctrl_c().await?;
    session.disconnect().await;
    println!("\nCall ended.");
    Ok(())
}
