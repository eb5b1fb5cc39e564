use std::time::Duration;

use anyhow::Context;
use longship_core::formats::Announcement;
use longship_infra::{get_ok, ServerUrls};
use reqwest::Client;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::UpdateEvent;

/// The announcement panel's state between polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncementBoard {
    content: String,
    hash: String,
}

impl AnnouncementBoard {
    /// Hash to send with the next request. Only sent while text is shown, so the server
    /// can answer with an empty body when nothing changed.
    pub fn query_hash(&self) -> Option<&str> {
        (!self.content.is_empty()).then_some(self.hash.as_str())
    }

    pub fn visible(&self) -> Option<&str> {
        (!self.content.is_empty()).then_some(self.content.as_str())
    }

    /// Fold a server response into the board and return the text to show.
    pub fn apply(&mut self, resp: Announcement) -> Option<&str> {
        if !resp.content.is_empty() {
            self.content = resp.content;
            self.hash = resp.hash;
        } else if resp.hash.is_empty() || resp.hash != self.hash {
            self.content.clear();
        }
        self.visible()
    }
}

/// Polls `/announcement` and publishes visible-text changes.
pub struct AnnouncementWatcher {
    client: Client,
    urls: ServerUrls,
    interval: Duration,
    board: AnnouncementBoard,
}

impl AnnouncementWatcher {
    /// `interval_secs == 0` polls once.
    pub fn new(client: Client, urls: ServerUrls, interval_secs: u64) -> Self {
        Self {
            client,
            urls,
            interval: Duration::from_secs(interval_secs),
            board: AnnouncementBoard::default(),
        }
    }

    pub fn board(&self) -> &AnnouncementBoard {
        &self.board
    }

    async fn fetch(&self) -> anyhow::Result<Announcement> {
        let url = self.urls.announcement(self.board.query_hash());
        let body = get_ok(&self.client, url)
            .await?
            .bytes()
            .await
            .context("Failed to read announcement body")?;
        Announcement::parse(&body).context("Malformed announcement")
    }

    /// One poll. A failed request hides the panel but keeps the last known text for the
    /// next hash comparison.
    pub async fn poll(&mut self) -> Option<String> {
        match self.fetch().await {
            Ok(resp) => self.board.apply(resp).map(str::to_string),
            Err(e) => {
                debug!("announcement request failed: {e:#}");
                None
            }
        }
    }

    /// Poll until cancelled, sending `UpdateEvent::Announcement` whenever the visible
    /// text changes. Returns early if the receiver is gone.
    pub async fn run(mut self, tx: Sender<UpdateEvent>, cancel: CancellationToken) {
        let mut published: Option<Option<String>> = None;
        loop {
            let visible = tokio::select! {
                _ = cancel.cancelled() => return,
                v = self.poll() => v,
            };
            if published.as_ref() != Some(&visible) {
                if tx
                    .send(UpdateEvent::Announcement(visible.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
                published = Some(visible);
            }

            if self.interval.is_zero() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
