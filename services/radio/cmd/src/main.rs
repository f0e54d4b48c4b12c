//! Radio frame tool.
//!
//! Encodes and decodes small radio frames, and drives the secure codec over a
//! UDP stand-in for the modem so nodes can be exercised on a bench.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use radio_secure::{
    FrameReceiver, RadioLink, ReceivedFrame, ReplayGuard, SecureError, SecureFrameCodec,
    SecurityAssociation,
};
use radio_storage::{open_store, CounterStore};
use radio_wire::{FrameBuilder, FrameType, OFrameBody, OFrameFlags};
use serde_json::json;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};

mod config;
mod logging;
mod udp;

use config::{parse_node_id, RadioConfig};
use udp::UdpLink;

/// Radio frame codec tool
#[derive(Parser, Debug)]
#[command(name = "otradio", version, about = "Encode, decode and exchange secure radio frames")]
struct Args {
    /// Configuration file path
    #[arg(long, global = true, default_value = "otradio.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Largest frame length byte, overriding the config file
    #[arg(long, global = true)]
    max_frame_len: Option<u8>,

    /// Keep counters in this directory, overriding the config file
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode one frame given as hex
    Decode {
        /// Frame bytes, hex
        hex: String,
    },
    /// Encode an 'O' frame and print it as hex
    Encode(FrameArgs),
    /// Encode a secure beacon and print it as hex
    Beacon,
    /// Receive frames over UDP and print them as JSON lines
    Listen {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:47000")]
        bind: SocketAddr,
    },
    /// Send 'O' frames over UDP
    Send {
        /// Destination address
        #[arg(long)]
        to: SocketAddr,
        /// Local bind address
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Number of frames to send
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Delay between frames, e.g. 10s
        #[arg(long, default_value = "10s")]
        interval: humantime::Duration,
        #[command(flatten)]
        frame: FrameArgs,
    },
    /// Forget stored counters for a node after its key changed
    ResetCounters {
        /// Node ID (hex); defaults to this node
        #[arg(long)]
        node_id: Option<String>,
    },
}

/// Contents of an 'O' frame
#[derive(clap::Args, Debug, Clone)]
struct FrameArgs {
    /// Valve percent open (0-100); omitted means no valve
    #[arg(long)]
    valve: Option<u8>,
    /// Call for heat
    #[arg(long)]
    call_for_heat: bool,
    /// Report low battery
    #[arg(long)]
    low_battery: bool,
    /// Stats as a JSON object, e.g. '{"b":1}'
    #[arg(long)]
    stats: Option<String>,
    /// Send without encryption, with a CRC trailer
    #[arg(long)]
    insecure: bool,
    /// Sequence number of the first insecure frame
    #[arg(long, default_value_t = 0)]
    seq: u8,
}

impl FrameArgs {
    fn body(&self) -> Result<OFrameBody> {
        let mut body = OFrameBody::empty();
        if let Some(pc) = self.valve {
            body = body.with_valve(pc)?;
        }
        body.call_for_heat = self.call_for_heat;
        if self.low_battery {
            body.flags |= OFrameFlags::LOW_BATTERY;
        }
        if let Some(ref stats) = self.stats {
            let map: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(stats).context("--stats must be a JSON object")?;
            body = body.with_stats(&map)?;
        }
        Ok(body)
    }
}

/// Configuration plus the objects built from it
struct Radio {
    config: RadioConfig,
    store: Arc<dyn CounterStore>,
    codec: SecureFrameCodec,
}

impl Radio {
    fn open(config: RadioConfig) -> Result<Self> {
        let store = open_store(config.storage_mode()?).context("opening counter store")?;
        let codec = config.codec();
        Ok(Self {
            config,
            store,
            codec,
        })
    }

    fn own_association(&self) -> Result<SecurityAssociation> {
        self.config
            .own_association(self.store.clone())?
            .context("node_id and key must be configured for secure frames")
    }

    fn receiver(&self) -> Result<FrameReceiver> {
        let table = self.config.association_table(self.store.clone())?;
        if table.is_empty() {
            info!("No associations configured; only insecure frames will be accepted");
        }
        Ok(FrameReceiver::new(self.codec.clone(), Arc::new(table)))
    }

    /// Leading node ID bytes carried in transmitted headers
    fn header_id<'a>(&self, assoc: &'a SecurityAssociation) -> &'a [u8] {
        let id = assoc.node_id().as_bytes();
        &id[..self.config.tx_id_len.min(id.len())]
    }

    /// Encode one 'O' frame; `seq` applies to insecure frames only
    fn encode_o_frame(
        &self,
        args: &FrameArgs,
        own: Option<&SecurityAssociation>,
        seq: u8,
    ) -> Result<Bytes> {
        let body = args.body()?.encode()?;
        if args.insecure {
            let id = own.map(|a| self.header_id(a)).unwrap_or_default();
            return Ok(FrameBuilder::new(FrameType::O_FRAME)
                .seq_num(seq)
                .id(Bytes::copy_from_slice(id))
                .body(body)
                .build(self.config.max_frame_len)?);
        }
        let own = own.context("node_id and key must be configured for secure frames")?;
        Ok(self
            .codec
            .encode(FrameType::O_FRAME, self.header_id(own), &body, own)?)
    }
}

/// JSON summary of an accepted frame
fn describe(frame: &ReceivedFrame) -> serde_json::Value {
    let o_frame = match frame.o_frame() {
        Some(Ok(body)) => json!({
            "valve_pc": body.valve_pc,
            "call_for_heat": body.call_for_heat,
            "flags": body.flags.bits(),
            "occupancy": body.occupancy,
            "stats": body.stats_json(),
        }),
        Some(Err(e)) => json!({ "error": e.to_string() }),
        None => serde_json::Value::Null,
    };
    json!({
        "type": frame.frame_type.to_string(),
        "secure": frame.secure,
        "seq": frame.seq_num,
        "id": hex::encode(&frame.id),
        "node_id": frame.node_id.as_ref().map(|n| n.to_string()),
        "body": hex::encode(&frame.body),
        "o_frame": o_frame,
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    info!("Starting otradio v{}", env!("CARGO_PKG_VERSION"));

    let mut config = RadioConfig::load_from_file(&args.config)?;
    if let Some(max) = args.max_frame_len {
        config.max_frame_len = max;
    }
    if let Some(dir) = args.data_dir {
        config.storage.mode = "file".to_string();
        config.storage.data_dir = dir;
    }
    config.validate()?;
    let radio = Radio::open(config)?;

    match args.command {
        Command::Decode { hex } => decode(&radio, &hex),
        Command::Encode(frame) => {
            let own = radio.config.own_association(radio.store.clone())?;
            let bytes = radio.encode_o_frame(&frame, own.as_ref(), frame.seq)?;
            println!("{}", hex::encode(&bytes));
            Ok(())
        }
        Command::Beacon => {
            let own = radio.own_association()?;
            let bytes = radio.codec.encode_beacon(radio.header_id(&own), &own)?;
            println!("{}", hex::encode(&bytes));
            Ok(())
        }
        Command::Listen { bind } => listen(&radio, bind).await,
        Command::Send {
            to,
            bind,
            count,
            interval,
            frame,
        } => send(&radio, to, bind, count, interval.into(), &frame).await,
        Command::ResetCounters { node_id } => reset_counters(&radio, node_id.as_deref()),
    }
}

fn decode(radio: &Radio, frame_hex: &str) -> Result<()> {
    let buf = hex::decode(frame_hex.trim()).context("frame is not hex")?;
    let receiver = radio.receiver()?;
    let frame = receiver.process(&buf)?;
    println!("{}", serde_json::to_string_pretty(&describe(&frame))?);
    Ok(())
}

async fn listen(radio: &Radio, bind: SocketAddr) -> Result<()> {
    let receiver = Arc::new(radio.receiver()?);
    let link = UdpLink::bind(bind, None)
        .await
        .with_context(|| format!("binding {}", bind))?;
    component_info!("listen", "Listening on {}", link.local_addr()?);

    let stats_receiver = receiver.clone();
    let stats_interval = radio.config.stats_interval()?;
    let stats_task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(stats_interval);
        timer.tick().await;
        loop {
            timer.tick().await;
            let s = stats_receiver.stats().snapshot();
            component_info!(
                "stats",
                "Receiver stats - received: {}, accepted: {}, malformed: {}, crc: {}, unknown node: {}, replayed: {}, auth failed: {}, padding: {}",
                s.received, s.accepted, s.malformed, s.crc_mismatch, s.unknown_node,
                s.replayed, s.auth_failed, s.padding_invalid
            );
        }
    });

    let result = tokio::select! {
        r = receiver.run(&link, |frame| println!("{}", describe(&frame))) => r.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            component_info!("listen", "Received interrupt, shutting down");
            Ok(())
        }
    };
    stats_task.abort();

    let s = receiver.stats().snapshot();
    component_info!("listen", "Final receiver stats: {}", serde_json::to_string(&s)?);
    result
}

async fn send(
    radio: &Radio,
    to: SocketAddr,
    bind: SocketAddr,
    count: u32,
    interval: Duration,
    frame: &FrameArgs,
) -> Result<()> {
    let own = radio.config.own_association(radio.store.clone())?;
    let link = UdpLink::bind(bind, Some(to)).await?;

    for i in 0..count {
        let seq = frame.seq.wrapping_add(i as u8) & 0x0f;
        let bytes = match radio.encode_o_frame(frame, own.as_ref(), seq) {
            Ok(bytes) => bytes,
            Err(e) => {
                if matches!(e.downcast_ref::<SecureError>(), Some(err) if err.is_fatal()) {
                    component_error!("send", "Cannot send: {}; install a new key", e);
                }
                return Err(e);
            }
        };
        debug!(len = bytes.len(), "sending frame");
        link.send_bytes(bytes).await?;
        component_info!("send", "Sent frame {}/{} to {}", i + 1, count, to);
        if i + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

fn reset_counters(radio: &Radio, node_id: Option<&str>) -> Result<()> {
    let node_id = match node_id.or(radio.config.node_id.as_deref()) {
        Some(s) => parse_node_id(s)?,
        None => bail!("no node id given and none configured"),
    };
    let guard = ReplayGuard::open(
        node_id.assoc_id(),
        radio.store.clone(),
        radio.config.counter_persistence,
    )?;
    guard.reset_for_new_key()?;
    component_warn!("keys", "Counters for {} reset; the next transmission starts at restart 0", node_id);
    Ok(())
}
