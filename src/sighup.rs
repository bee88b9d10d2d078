//! Listens for `SIGHUP` and reloads the configuration file in place. On
//! non-Unix targets, never fires (there is no reload signal to listen for).

#[cfg(target_family = "unix")]
use tokio::signal::unix::*;

pub struct Sighup {
    #[cfg(target_family = "unix")]
    sig: Signal,
}

impl Sighup {
    pub fn new() -> std::io::Result<Self> {
        #[cfg(target_family = "unix")]
        let sig = signal(SignalKind::hangup())?;

        Ok(Self {
            #[cfg(target_family = "unix")]
            sig,
        })
    }

    pub async fn listen(&mut self) {
        #[cfg(target_family = "unix")]
        self.sig.recv().await;

        #[cfg(not(target_family = "unix"))]
        loop {
            tokio::time::sleep(std::time::Duration::MAX).await;
        }
    }
}
