use std::io;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use proto::MessageKind;

use crate::{EpmdClient, Error, NodeIdentity, Tcp, Transport};

/// Where the registration loop currently stands. Only the loop itself
/// writes this; everyone else reads snapshots through the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
    Registered {
        creation: u16,
    },
}

impl SessionState {
    /// The creation epmd assigned, 0 while not registered.
    pub fn creation(&self) -> u16 {
        match self {
            Self::Registered { creation } => *creation,
            _ => 0,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    /// Host of the epmd to register with. Registration is a local affair,
    /// so this stays on loopback unless the daemon is bound elsewhere.
    pub epmd_host: String,
    /// Bound on each connect attempt so shutdown is never stuck behind a
    /// hung connect.
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            epmd_host: "127.0.0.1".to_string(),
            connect_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Keeps a node registered with its local epmd for the life of the process.
///
/// The loop connects, registers, then sits on the connection until it drops
/// or misbehaves; every failure is treated as a disconnect and answered
/// with a fresh attempt after a capped, jittered backoff. It never reports
/// an error to the caller and never gives up, only [RegistrationHandle::stop]
/// ends it.
pub struct Registration;

impl Registration {
    pub fn spawn(identity: NodeIdentity) -> RegistrationHandle {
        Self::spawn_with(identity, Tcp, RegistrationOptions::default())
    }

    pub fn spawn_with<T>(
        identity: NodeIdentity,
        transport: T,
        options: RegistrationOptions,
    ) -> RegistrationHandle
    where
        T: Transport + 'static,
    {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(identity, transport, options, state_tx, shutdown_rx));

        RegistrationHandle {
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }
}

#[derive(Debug)]
pub struct RegistrationHandle {
    state: watch::Receiver<SessionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RegistrationHandle {
    /// The creation from the most recent successful registration, 0 while
    /// not registered.
    pub fn creation(&self) -> u16 {
        self.state.borrow().creation()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change of the loop.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Signals the loop to stop. Checked before every connect attempt and
    /// while blocked on the connection or the backoff sleep.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for the loop to finish after [Self::stop].
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

async fn run<T: Transport>(
    identity: NodeIdentity,
    transport: T,
    options: RegistrationOptions,
    state: watch::Sender<SessionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(options.backoff_base, options.backoff_cap);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match attempt(
            &identity,
            &transport,
            &options,
            &state,
            &mut shutdown,
            &mut backoff,
        )
        .await
        {
            // only a stop signal gets the attempt out cleanly
            Ok(()) => break,
            Err(err) => {
                warn!(node = %identity.full_name, error = %err, "registration lost, reconnecting");
            }
        }

        let _ = state.send(SessionState::Disconnected);

        let delay = backoff.delay();
        debug!(?delay, "waiting before reconnect");
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = time::sleep(delay) => {}
        }
    }

    let _ = state.send(SessionState::Disconnected);
    debug!(node = %identity.full_name, "registration loop stopped");
}

/// One full cycle: connect, register, then watch the connection. Returns
/// `Ok` only when shutdown was signalled while everything was healthy.
async fn attempt<T: Transport>(
    identity: &NodeIdentity,
    transport: &T,
    options: &RegistrationOptions,
    state: &watch::Sender<SessionState>,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> Result<(), Error> {
    let connect = transport.connect(&options.epmd_host, identity.epmd_port);
    let stream = match time::timeout(options.connect_timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(Error::Connect(err)),
        Err(_) => {
            return Err(Error::Connect(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            )))
        }
    };
    let _ = state.send(SessionState::Connected);

    let mut client = EpmdClient::new(stream);
    let creation = client.register_node(identity).await?;
    let _ = state.send(SessionState::Registered { creation });
    info!(node = %identity.full_name, creation, "registered with epmd");
    backoff.reset();

    tokio::select! {
        _ = shutdown.changed() => Ok(()),
        err = client.monitor() => {
            if let Error::UnexpectedMessage(op) = &err {
                match MessageKind::try_from(*op) {
                    Ok(kind) => warn!(?kind, "unsolicited message from epmd"),
                    Err(_) => warn!(opcode = op, "unknown byte from epmd"),
                }
            }
            Err(err)
        }
    }
}

/// Capped exponential backoff with jitter. Spreads retries so a host worth
/// of restarting nodes does not hammer epmd in lockstep.
struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay(&mut self) -> Duration {
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(16));
        self.attempt = self.attempt.saturating_add(1);
        exp.min(self.cap).mul_f64(0.5 + fastrand::f64() / 2.0)
    }
}
