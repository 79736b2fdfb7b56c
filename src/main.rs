use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tutor_voice::audio::{AudioCapture, CaptureSource, CpalSink, PlaybackScheduler, write_wav};
use tutor_voice::live::gemini::DEFAULT_ENDPOINT;
use tutor_voice::{GeminiConnector, SessionConfig, SessionStatus, VoiceSession};

/// Tutor Voice - realtime voice sessions with an AI tutor
#[derive(Parser)]
#[command(name = "tutor-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a live voice session
    Run {
        /// Subject context for the tutor (e.g. "Science")
        #[arg(short, long, default_value = "General")]
        subject: String,

        /// Grade context for the tutor (e.g. "Grade 5")
        #[arg(short, long, default_value = "General")]
        grade: String,

        /// Response language tag ("ar", "en", "fr")
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Live API key
        #[arg(long, env = "TUTOR_VOICE_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Live API endpoint
        #[arg(long, env = "TUTOR_VOICE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },
    /// Test microphone input and dump it to a WAV file
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Output path
        #[arg(short, long, default_value = "mic-test.wav")]
        output: String,
    },
    /// Test speaker output with a short tone
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,tutor_voice=info",
        1 => "info,tutor_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run {
            subject,
            grade,
            language,
            api_key,
            endpoint,
        } => run_session(&subject, &grade, &language, &endpoint, &api_key).await,
        Command::TestMic { duration, output } => test_mic(duration, &output).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

async fn run_session(
    subject: &str,
    grade: &str,
    language: &str,
    endpoint: &str,
    api_key: &str,
) -> anyhow::Result<()> {
    let config = SessionConfig::new(subject, grade, language);
    let connector = GeminiConnector::with_endpoint(endpoint, api_key);
    let capture = AudioCapture::new(
        config.audio.capture_sample_rate,
        config.audio.frame_samples,
    );
    let (sink, ended_rx) = CpalSink::new(config.audio.playback_sample_rate)?;

    let mut session = VoiceSession::new();
    session
        .start(&config, &connector, Box::new(capture), sink, ended_rx)
        .await?;

    println!("Listening. Speak into the microphone; Ctrl-C to stop.");

    // Print transcript fragments as they accumulate.
    let mut transcript = session.transcript();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        while transcript.changed().await.is_ok() {
            let text = transcript.borrow_and_update().clone();
            if text.len() > printed {
                print!("{}", &text[printed..]);
                let _ = std::io::Write::flush(&mut std::io::stdout());
                printed = text.len();
            }
        }
    });

    let mut status = session.status();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        }
        _ = async {
            while status.changed().await.is_ok() {
                if *status.borrow_and_update() == SessionStatus::Closed {
                    break;
                }
            }
        } => {
            tracing::info!("session closed by remote end");
        }
    }

    session.stop().await;
    printer.abort();
    println!();
    Ok(())
}

async fn test_mic(duration: u64, output: &str) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new(16_000, 4096);
    let mut frames = capture.start()?;

    println!("Recording for {duration} seconds...");
    let mut samples = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            frame = frames.recv() => match frame {
                Some(frame) => samples.extend(frame),
                None => break,
            },
        }
    }
    capture.stop();

    write_wav(std::path::Path::new(output), &samples, 16_000)?;
    println!("Wrote {} samples to {output}", samples.len());
    Ok(())
}

async fn test_speaker() -> anyhow::Result<()> {
    let (sink, mut ended_rx) = CpalSink::new(24_000)?;
    let mut scheduler = PlaybackScheduler::new(sink, 24_000);

    // One second of A4.
    let tone: Vec<f32> = (0..24_000)
        .map(|i| {
            let t = f64::from(i) / 24_000.0;
            #[allow(clippy::cast_possible_truncation)]
            let sample = (0.3 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as f32;
            sample
        })
        .collect();

    let scheduled = scheduler.enqueue(tone)?;
    println!("Playing test tone...");

    let waited = tokio::time::timeout(Duration::from_secs(3), ended_rx.recv()).await;
    match waited {
        Ok(Some(id)) if id == scheduled.id => println!("Playback complete."),
        _ => anyhow::bail!("playback did not complete"),
    }
    Ok(())
}
