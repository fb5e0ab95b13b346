//! CLI for personbus
//!
//! Subcommands:
//! - `broker`: run the broker service
//! - `send`: send a person to the queue
//! - `publish`: publish a person to the topic, optionally tagged VIP/Regular
//! - `receive`: consume persons from the queue
//! - `subscribe`: consume persons from a topic subscription

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use personbus::broker::{EntityPath, MemoryBroker};
use personbus::cli::{prompt_filter, prompt_subscription};
use personbus::codec::JsonCodec;
use personbus::config::{Settings, load_config};
use personbus::consumer::{Consumer, LoggingProcessor, MessageFilter};
use personbus::model::{MessageType, Person};
use personbus::publisher::Publisher;
use personbus::transport::{RemoteReceiver, RemoteSender, start_websocket_server};
use personbus::utils::logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "personbus")]
enum Command {
    /// Run the broker service
    Broker,
    /// Send a person to the configured queue
    Send(PersonArgs),
    /// Publish a person to the configured topic
    Publish {
        #[command(flatten)]
        person: PersonArgs,
        /// Classification attached as the `MessageType` property
        #[arg(long, value_enum, ignore_case = true)]
        message_type: Option<MessageType>,
    },
    /// Receive persons from the configured queue
    Receive,
    /// Receive persons from a subscription on the configured topic
    Subscribe {
        /// Subscription name; prompts for one when omitted
        #[arg(long)]
        subscription: Option<String>,
        /// Only process messages with this classification
        #[arg(long, value_enum, ignore_case = true)]
        message_type: Option<MessageType>,
    },
}

#[derive(Args)]
struct PersonArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
}

impl From<PersonArgs> for Person {
    fn from(args: PersonArgs) -> Self {
        Person::new(args.first_name, args.last_name)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::parse();
    let settings = load_config().context("loading configuration")?;
    logging::init(&settings.logging.level);

    match cmd {
        Command::Broker => run_broker(&settings, shutdown_on_ctrl_c()).await,
        Command::Send(person) => {
            let queue = EntityPath::queue(settings.queue_name()?);
            run_publish(&settings, queue, person.into(), None).await
        }
        Command::Publish {
            person,
            message_type,
        } => {
            let topic = EntityPath::topic(settings.topic_name()?);
            run_publish(&settings, topic, person.into(), message_type).await
        }
        Command::Receive => {
            let queue_name = settings.queue_name()?;
            let queue = EntityPath::queue(queue_name);
            let filter = MessageFilter::all();
            run_consumer(&settings, queue, queue_name, filter, shutdown_on_ctrl_c()).await
        }
        Command::Subscribe {
            subscription,
            message_type,
        } => {
            let topic_name = settings.topic_name()?;
            // Prompts block on stdin, so they run before the ctrl-c handler
            // takes over SIGINT.
            let (subscription, message_type) = match subscription {
                Some(name) => (name, message_type),
                None => choose_subscription(&settings, message_type)?,
            };
            let path = EntityPath::subscription(topic_name, subscription.as_str());
            let filter = MessageFilter::from(message_type);
            run_consumer(&settings, path, &subscription, filter, shutdown_on_ctrl_c()).await
        }
    }
}

/// Returns a token cancelled on the first ctrl-c.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Exiting gracefully.");
            token.cancel();
        }
    });
    cancel
}

fn choose_subscription(
    settings: &Settings,
    message_type: Option<MessageType>,
) -> Result<(String, Option<MessageType>)> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();

    let subscription = prompt_subscription(&mut input, &mut output, &settings.entities.subscriptions)?;
    let message_type = match message_type {
        Some(t) => Some(t),
        None => prompt_filter(&mut input, &mut output)?,
    };
    Ok((subscription, message_type))
}

async fn run_broker(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let broker = Arc::new(MemoryBroker::new(settings.broker_options()));

    if let Ok(queue) = settings.queue_name() {
        broker.provision_queue(queue);
        info!(%queue, "Provisioned queue");
    }
    if let Ok(topic) = settings.topic_name() {
        broker.provision_topic(topic, &settings.entities.subscriptions);
        info!(%topic, subscriptions = ?settings.entities.subscriptions, "Provisioned topic");
    }

    let addr = settings.server_addr();
    start_websocket_server(&addr, broker, cancel)
        .await
        .with_context(|| format!("running broker on {addr}"))
}

async fn run_publish(
    settings: &Settings,
    entity: EntityPath,
    person: Person,
    message_type: Option<MessageType>,
) -> Result<()> {
    let endpoint = settings.endpoint()?;
    let sender = RemoteSender::connect(endpoint, entity.clone())
        .await
        .with_context(|| format!("connecting to {endpoint}"))?;
    let publisher = Publisher::new(sender, JsonCodec::<Person>::new());

    let result = publisher
        .publish_person(&person, message_type.map(|t| t.as_str()))
        .await;
    if let Err(e) = publisher.into_sender().close().await {
        warn!(error = %e, "Failed to close sender");
    }

    let message_id = result.with_context(|| format!("Failed to send message to {entity}"))?;
    info!(%entity, %message_id, "Sent {}", person.full_name());
    Ok(())
}

async fn run_consumer(
    settings: &Settings,
    entity: EntityPath,
    label: &str,
    filter: MessageFilter,
    cancel: CancellationToken,
) -> Result<()> {
    let endpoint = settings.endpoint()?;
    let receiver = RemoteReceiver::connect(endpoint, entity.clone())
        .await
        .with_context(|| format!("connecting to {endpoint}"))?;

    info!(entity = %receiver.entity(), "Connected. Press Ctrl+C to exit");
    let consumer = Consumer::new(receiver, JsonCodec::<Person>::new(), LoggingProcessor::new(label))
        .with_filter(filter)
        .with_receive_timeout(settings.receive_timeout())
        .with_label(label);

    let result = consumer.run(&cancel).await;
    if let Err(e) = consumer.source().close().await {
        warn!(error = %e, "Failed to close receiver");
    }

    let stats = result.with_context(|| format!("receiving from {entity}"))?;
    info!(
        received = stats.received,
        completed = stats.completed,
        skipped = stats.skipped,
        dead_lettered = stats.deserialization_failures + stats.processing_failures,
        abandoned = stats.abandoned,
        "Receiver for {label} stopped."
    );
    Ok(())
}
