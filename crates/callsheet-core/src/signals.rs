use std::fmt;

use tracing::error;

/// What ended a `watch` session.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ShutdownSignal {
  Interrupt,
  Terminate,
  CtrlC
}

impl fmt::Display for ShutdownSignal {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::Interrupt => "SIGINT",
      | Self::Terminate => "SIGTERM",
      | Self::CtrlC => "ctrl-c"
    })
  }
}

#[cfg(unix)]
pub async fn wait_for_shutdown_signal()
-> ShutdownSignal {
  use tokio::signal::unix::{
    SignalKind,
    signal
  };

  let streams = signal(
    SignalKind::interrupt()
  )
  .and_then(|sigint| {
    signal(SignalKind::terminate())
      .map(|sigterm| (sigint, sigterm))
  });

  let (mut sigint, mut sigterm) =
    match streams {
      | Ok(pair) => pair,
      | Err(error) => {
        error!(
          %error,
          "unix signal handlers \
           unavailable; waiting on \
           ctrl_c"
        );
        return ctrl_c().await;
      }
    };

  tokio::select! {
    _ = sigint.recv() => ShutdownSignal::Interrupt,
    _ = sigterm.recv() => ShutdownSignal::Terminate,
  }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal()
-> ShutdownSignal {
  ctrl_c().await
}

async fn ctrl_c() -> ShutdownSignal {
  if let Err(error) =
    tokio::signal::ctrl_c().await
  {
    error!(
      %error,
      "failed waiting for ctrl_c \
       signal"
    );
  }
  ShutdownSignal::CtrlC
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_each_signal() {
    assert_eq!(
      ShutdownSignal::Interrupt
        .to_string(),
      "SIGINT"
    );
    assert_eq!(
      ShutdownSignal::Terminate
        .to_string(),
      "SIGTERM"
    );
    assert_eq!(
      ShutdownSignal::CtrlC.to_string(),
      "ctrl-c"
    );
  }
}
