use std::io::Write;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::navigation::NavigationRequest;
use crate::notifications::{Notification, NotificationCenter, NotificationId};
use crate::render::{Palette, visible_width};

const CLOSE_MARKER: &str = "[x]";

#[derive(Debug, Clone, PartialEq)]
pub struct PopupTile {
    pub id: NotificationId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// Anywhere on the tile except the close marker.
    Tile,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupAction {
    Navigate(NavigationRequest),
    Dismissed,
    /// The tile was already gone when the click landed.
    Ignored,
}

/// Stateless view over the active notification set.
pub struct PopupView {
    center: Arc<NotificationCenter>,
    updates: watch::Receiver<Vec<Notification>>,
}

impl PopupView {
    pub fn new(center: Arc<NotificationCenter>) -> Self {
        let updates = center.subscribe();
        Self { center, updates }
    }

    pub fn tiles(&self) -> Vec<PopupTile> {
        self.updates
            .borrow()
            .iter()
            .map(|n| PopupTile {
                id: n.id,
                message: n.message.clone(),
            })
            .collect()
    }

    pub fn is_visible(&self) -> bool {
        !self.updates.borrow().is_empty()
    }

    pub fn tile_at(&self, position: usize) -> Option<PopupTile> {
        self.tiles().into_iter().nth(position)
    }

    /// Close clicks dismiss and stop there; they never fall through to the
    /// tile's navigation.
    #[instrument(skip(self))]
    pub fn click(&self, id: NotificationId, target: ClickTarget) -> PopupAction {
        match target {
            ClickTarget::Close => {
                if self.center.dismiss(id) {
                    PopupAction::Dismissed
                } else {
                    PopupAction::Ignored
                }
            }
            ClickTarget::Tile => match self.center.get(id) {
                Some(notification) => {
                    debug!(phone = ?notification.customer.phone_no, "opening customer from popup");
                    PopupAction::Navigate(NavigationRequest::customer_edit(notification.customer))
                }
                None => PopupAction::Ignored,
            },
        }
    }

    /// Waits for the next change to the set. Returns `false` once the
    /// notification center is gone.
    pub async fn changed(&mut self) -> bool {
        self.updates.changed().await.is_ok()
    }

    pub fn render_to<W: Write>(&self, writer: &mut W, palette: Palette) -> anyhow::Result<()> {
        let tiles = self.tiles();
        if tiles.is_empty() {
            return Ok(());
        }

        let lines: Vec<String> = tiles
            .iter()
            .enumerate()
            .map(|(idx, tile)| format!("[{}] {}", idx + 1, tile.message))
            .collect();
        let inner = lines
            .iter()
            .map(|line| visible_width(line))
            .max()
            .unwrap_or_default()
            + 1
            + CLOSE_MARKER.len();
        let border = format!("+{}+", "-".repeat(inner + 2));

        for line in lines {
            let padding = inner - CLOSE_MARKER.len() - visible_width(&line);
            writeln!(writer, "{border}")?;
            writeln!(
                writer,
                "| {}{}{} |",
                palette.paint(&line, "1"),
                " ".repeat(padding),
                palette.paint(CLOSE_MARKER, "31")
            )?;
            writeln!(writer, "{border}")?;
        }

        Ok(())
    }
}
