//! Authentication state shared with the favorites store.

use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
  pub is_authenticated: bool,
  pub token: Option<String>,
}

impl Session {
  pub fn guest() -> Self {
    Self::default()
  }

  pub fn authenticated(token: impl Into<String>) -> Self {
    Self {
      is_authenticated: true,
      token: Some(token.into()),
    }
  }

  /// Token to send, only while authenticated.
  pub fn bearer(&self) -> Option<&str> {
    if self.is_authenticated {
      self.token.as_deref()
    } else {
      None
    }
  }
}

/// Owner side of the session channel. Subscribers see every transition.
pub struct SessionHandle {
  tx: watch::Sender<Session>,
}

impl SessionHandle {
  pub fn new(initial: Session) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  pub fn subscribe(&self) -> watch::Receiver<Session> {
    self.tx.subscribe()
  }

  pub fn current(&self) -> Session {
    self.tx.borrow().clone()
  }

  pub fn sign_in(&self, token: impl Into<String>) {
    self.tx.send_replace(Session::authenticated(token));
  }

  /// Drop back to guest mode, e.g. after the server rejected the token.
  pub fn sign_out(&self) {
    self.tx.send_replace(Session::guest());
  }
}
