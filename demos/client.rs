use argh::FromArgs;
use std::path::PathBuf;

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Infernum client for running inference and checking results
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "inference", "results", "chat", "transcript" or "state"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Inference(InferenceCommand),
    Results(ResultsCommand),
    Chat(ChatCommand),
    Transcript(TranscriptCommand),
    State(StateCommand),
}

#[derive(FromArgs)]
/// Schedule inference with an image and prompt
#[argh(subcommand, name = "inference")]
struct InferenceCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: String,
}

#[derive(FromArgs)]
/// Wait for the result of a scheduled inference
#[argh(subcommand, name = "results")]
struct ResultsCommand {
    /// the id returned when the inference was scheduled
    #[argh(positional)]
    id: u64,

    /// how long to wait for the result, in milliseconds
    #[argh(option, short = 't')]
    timeout_ms: Option<u64>,
}

#[derive(FromArgs)]
/// Ask a question about an image and print the conversation
#[argh(subcommand, name = "chat")]
struct ChatCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: String,
}

#[derive(FromArgs)]
/// Print the conversation so far
#[argh(subcommand, name = "transcript")]
struct TranscriptCommand {}

#[derive(FromArgs)]
/// Print the engine state
#[argh(subcommand, name = "state")]
struct StateCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let request = match args.command {
        ClientCommands::Inference(command) => client
            .post(format!("http://{}/inference", addr))
            .json(&messages::InferenceRequest {
                image_path: command.image_path,
                prompt: command.prompt,
            }),
        ClientCommands::Results(command) => client
            .get(format!("http://{}/results/{}", addr, command.id))
            .query(&messages::ResultsQuery {
                timeout_ms: command.timeout_ms,
            }),
        ClientCommands::Chat(command) => client
            .post(format!("http://{}/chat", addr))
            .json(&messages::InferenceRequest {
                image_path: command.image_path,
                prompt: command.prompt,
            }),
        ClientCommands::Transcript(_) => client.get(format!("http://{}/transcript", addr)),
        ClientCommands::State(_) => client.get(format!("http://{}/state", addr)),
    };

    let response = request.send().await?;
    let result = response.json::<serde_json::Value>().await?;
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
