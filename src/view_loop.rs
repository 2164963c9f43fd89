//! Single-consumer event loop around the [`ViewController`].
//!
//! One task owns the controller. HTTP handlers (or anything else) talk to it
//! through a [`ViewHandle`], which sends [`ViewCommand`]s over an mpsc
//! channel and waits for the reply on a oneshot. Commands are applied one
//! at a time, so a toggle always finishes before the next update reads the
//! model.

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::hierarchy::Tree;
use crate::record::export_rows;
use crate::scene::Scene;
use crate::view::ViewController;

const CHANNEL_CAPACITY: usize = 64;

/// Requests accepted by the view loop.
enum ViewCommand {
    Render {
        reply: oneshot::Sender<Scene>,
    },
    Activate {
        id: i64,
        reply: oneshot::Sender<Option<Scene>>,
    },
    Replace {
        tree: Tree,
        fingerprint: String,
        reply: oneshot::Sender<Scene>,
    },
    Fingerprint {
        reply: oneshot::Sender<String>,
    },
    Export {
        reply: oneshot::Sender<String>,
    },
}

/// Cloneable sender side of the view loop.
#[derive(Clone)]
pub struct ViewHandle {
    sender: mpsc::Sender<ViewCommand>,
}

/// Spawn the loop on the current tokio runtime.
///
/// `fingerprint` identifies the snapshot the controller's tree was built
/// from.
pub fn spawn(controller: ViewController, fingerprint: String) -> ViewHandle {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run(controller, fingerprint, receiver));
    ViewHandle { sender }
}

async fn run(
    mut controller: ViewController,
    mut fingerprint: String,
    mut receiver: mpsc::Receiver<ViewCommand>,
) {
    info!(
        "View loop started ({} nodes)",
        controller.tree().len()
    );

    while let Some(command) = receiver.recv().await {
        match command {
            ViewCommand::Render { reply } => {
                let _ = reply.send(controller.render().clone());
            }
            ViewCommand::Activate { id, reply } => {
                if !controller.tree().contains(id) {
                    warn!("Ignoring activation of unknown node {}", id);
                    let _ = reply.send(None);
                    continue;
                }
                let scene = controller.activate(id).clone();
                debug!(
                    "Node {} {} ({} visible)",
                    id,
                    if controller.is_expanded(id) == Some(true) { "expanded" } else { "collapsed" },
                    scene.visible_ids().len()
                );
                let _ = reply.send(Some(scene));
            }
            ViewCommand::Replace {
                tree,
                fingerprint: next,
                reply,
            } => {
                let config = controller.config().clone();
                controller = ViewController::new(tree, config);
                fingerprint = next;
                info!(
                    "View replaced with snapshot {} ({} nodes)",
                    fingerprint,
                    controller.tree().len()
                );
                let _ = reply.send(controller.render().clone());
            }
            ViewCommand::Fingerprint { reply } => {
                let _ = reply.send(fingerprint.clone());
            }
            ViewCommand::Export { reply } => {
                let _ = reply.send(export_rows(controller.tree().records()));
            }
        }
    }

    debug!("View loop stopped: all handles dropped");
}

impl ViewHandle {
    async fn request<T>(
        &self,
        make_command: impl FnOnce(oneshot::Sender<T>) -> ViewCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make_command(tx))
            .await
            .map_err(|_| anyhow!("view loop has stopped"))?;
        rx.await.map_err(|_| anyhow!("view loop did not respond"))
    }

    /// Current scene (`renderTree`).
    pub async fn render(&self) -> Result<Scene> {
        self.request(|reply| ViewCommand::Render { reply }).await
    }

    /// Toggle a node and return the new scene (`onActivate`).
    /// `None` if the id is not in the current tree.
    pub async fn activate(&self, id: i64) -> Result<Option<Scene>> {
        self.request(|reply| ViewCommand::Activate { id, reply }).await
    }

    /// Swap in a new tree, discarding the current view-state.
    pub async fn replace(&self, tree: Tree, fingerprint: String) -> Result<Scene> {
        self.request(|reply| ViewCommand::Replace {
            tree,
            fingerprint,
            reply,
        })
        .await
    }

    /// Fingerprint of the snapshot currently displayed.
    pub async fn fingerprint(&self) -> Result<String> {
        self.request(|reply| ViewCommand::Fingerprint { reply }).await
    }

    /// Current records in export row format.
    pub async fn export(&self) -> Result<String> {
        self.request(|reply| ViewCommand::Export { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::inventory::Snapshot;

    const ROWS: &str = "1,organization,resource,org/1,0,Acme,\n\
                        2,project,resource,proj/2,1,,proj-a\n\
                        3,bucket,resource,buck/3,2,,my-bucket\n";

    fn start(text: &str) -> ViewHandle {
        let snapshot = Snapshot::new(text.to_string());
        let tree = snapshot.build().unwrap();
        spawn(
            ViewController::new(tree, LayoutConfig::default()),
            snapshot.fingerprint,
        )
    }

    #[tokio::test]
    async fn test_render_and_activate() {
        let handle = start(ROWS);
        assert_eq!(handle.render().await.unwrap().visible_ids(), vec![1, 2]);

        let scene = handle.activate(2).await.unwrap().unwrap();
        assert_eq!(scene.visible_ids(), vec![1, 2, 3]);
        assert_eq!(handle.render().await.unwrap(), scene);
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected_without_panicking() {
        let handle = start(ROWS);
        assert!(handle.activate(404).await.unwrap().is_none());
        // Loop is still alive.
        assert_eq!(handle.render().await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_activations_apply_in_order() {
        let handle = start(ROWS);
        let a = handle.clone();
        let b = handle.clone();
        let (first, second) = tokio::join!(a.activate(2), b.activate(2));
        let revisions = [
            first.unwrap().unwrap().revision,
            second.unwrap().unwrap().revision,
        ];
        assert!(revisions.contains(&2) && revisions.contains(&3));
        assert_eq!(handle.render().await.unwrap().visible_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_replace_resets_view_state() {
        let handle = start(ROWS);
        handle.activate(2).await.unwrap();

        let next = Snapshot::new(format!("{}4,disk,resource,d/4,1,,disk-1\n", ROWS));
        let scene = handle
            .replace(next.build().unwrap(), next.fingerprint.clone())
            .await
            .unwrap();
        assert_eq!(scene.visible_ids(), vec![1, 2, 4]);
        assert_eq!(handle.fingerprint().await.unwrap(), next.fingerprint);
    }

    #[tokio::test]
    async fn test_export_round_trips_rows() {
        let handle = start(ROWS);
        assert_eq!(handle.export().await.unwrap(), ROWS);
    }
}
