//! Shared backend ownership and hot-swap.
//!
//! The loaded backend is process-wide state: every session observes the
//! same current variant, and a switch initiated by one session is visible
//! to all others as soon as it succeeds. Mutation is serialised through a
//! dedicated loader task (at most one load in flight); `describe()` and the
//! other read paths are lock-read snapshots that never block and reflect
//! last-known-good state while a load runs.
//!
//! ## Load queueing
//!
//! Requests that arrive while a load is running are drained when it
//! finishes: the last distinct variant wins, duplicate requests for the
//! same variant collapse into one load, and every drained waiter receives
//! the winning load's outcome.
//!
//! ## Device fallback
//!
//! A load targeting the accelerated device that fails is retried exactly
//! once on CPU with the same variant. If that also fails the previous
//! backend stays active — `current` never regresses to none once a model
//! has been loaded.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Result, VerbatimError};
use crate::inference::{BackendFactory, BackendHandle};

/// Compute device a backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Accelerated device (GPU offload).
    Gpu,
    /// General-purpose fallback.
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Gpu => "gpu",
            Device::Cpu => "cpu",
        })
    }
}

/// Static per-variant metadata. Speed and accuracy are 1-5 tiers.
#[derive(Debug, Clone, Serialize)]
pub struct VariantInfo {
    pub name: &'static str,
    pub size: &'static str,
    pub speed: u8,
    pub accuracy: u8,
}

/// Built-in variant catalog.
pub fn variant_catalog() -> &'static [VariantInfo] {
    const CATALOG: &[VariantInfo] = &[
        VariantInfo {
            name: "tiny",
            size: "39 MB",
            speed: 5,
            accuracy: 2,
        },
        VariantInfo {
            name: "base",
            size: "74 MB",
            speed: 4,
            accuracy: 3,
        },
        VariantInfo {
            name: "small",
            size: "244 MB",
            speed: 3,
            accuracy: 4,
        },
        VariantInfo {
            name: "medium",
            size: "769 MB",
            speed: 2,
            accuracy: 5,
        },
    ];
    CATALOG
}

/// Snapshot of the manager's state for the admin surface. Never blocks.
#[derive(Debug, Clone, Serialize)]
pub struct BackendDescriptor {
    pub available_models: Vec<String>,
    pub current_model: Option<String>,
    pub device: Device,
    pub models_info: Vec<VariantInfo>,
}

/// Outcome of a successful load, for `model_changed` replies.
#[derive(Debug, Clone)]
pub struct ModelChange {
    pub variant: String,
    pub device: Device,
}

struct LoadRequest {
    variant: String,
    reply: oneshot::Sender<Result<ModelChange>>,
}

struct CurrentBackend {
    handle: BackendHandle,
    variant: String,
    device: Device,
}

struct Shared {
    current: RwLock<Option<CurrentBackend>>,
    preferred_device: Device,
}

/// Owns the current transcription backend and serialises variant switches.
pub struct BackendManager {
    shared: Arc<Shared>,
    load_tx: mpsc::UnboundedSender<LoadRequest>,
}

impl BackendManager {
    /// Create a manager with no variant loaded yet.
    ///
    /// Spawns the loader task, so this must be called from within a Tokio
    /// runtime.
    pub fn new(factory: Arc<dyn BackendFactory>, preferred_device: Device) -> Arc<Self> {
        let shared = Arc::new(Shared {
            current: RwLock::new(None),
            preferred_device,
        });
        let load_tx = spawn_loader(Arc::clone(&shared), factory);
        Arc::new(Self { shared, load_tx })
    }

    /// Switch the shared backend to `variant`.
    ///
    /// Idempotent: requesting the currently-loaded variant succeeds without
    /// invoking the factory. Unknown names fail up front without touching
    /// state. Everything else goes through the single-flight loader task.
    pub async fn load_variant(&self, variant: &str) -> Result<ModelChange> {
        if !variant_catalog().iter().any(|v| v.name == variant) {
            return Err(VerbatimError::UnknownVariant {
                name: variant.to_string(),
            });
        }

        if let Some(change) = self.change_if_current(variant) {
            debug!(variant, "variant already loaded");
            return Ok(change);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.load_tx
            .send(LoadRequest {
                variant: variant.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| VerbatimError::LoaderUnavailable)?;

        reply_rx.await.map_err(|_| VerbatimError::LoaderUnavailable)?
    }

    /// Name of the currently loaded variant, if any.
    pub fn current_variant(&self) -> Option<String> {
        self.shared
            .current
            .read()
            .as_ref()
            .map(|c| c.variant.clone())
    }

    /// Device of the current backend; the preferred device when nothing is
    /// loaded yet.
    pub fn device(&self) -> Device {
        self.shared
            .current
            .read()
            .as_ref()
            .map(|c| c.device)
            .unwrap_or(self.shared.preferred_device)
    }

    /// Clone of the current backend handle for inference, if loaded.
    pub fn backend(&self) -> Option<BackendHandle> {
        self.shared
            .current
            .read()
            .as_ref()
            .map(|c| c.handle.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.current.read().is_some()
    }

    /// Descriptor snapshot for the admin surface.
    pub fn describe(&self) -> BackendDescriptor {
        let current = self.shared.current.read();
        BackendDescriptor {
            available_models: variant_catalog()
                .iter()
                .map(|v| v.name.to_string())
                .collect(),
            current_model: current.as_ref().map(|c| c.variant.clone()),
            device: current
                .as_ref()
                .map(|c| c.device)
                .unwrap_or(self.shared.preferred_device),
            models_info: variant_catalog().to_vec(),
        }
    }

    fn change_if_current(&self, variant: &str) -> Option<ModelChange> {
        self.shared
            .current
            .read()
            .as_ref()
            .filter(|c| c.variant == variant)
            .map(|c| ModelChange {
                variant: c.variant.clone(),
                device: c.device,
            })
    }
}

impl fmt::Debug for BackendManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendManager")
            .field("current_variant", &self.current_variant())
            .field("preferred_device", &self.shared.preferred_device)
            .finish()
    }
}

fn spawn_loader(
    shared: Arc<Shared>,
    factory: Arc<dyn BackendFactory>,
) -> mpsc::UnboundedSender<LoadRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<LoadRequest>();

    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            // Drain everything queued behind this request: the last distinct
            // variant wins and every waiter gets the winning outcome.
            let mut waiters = vec![first.reply];
            let mut variant = first.variant;
            while let Ok(next) = rx.try_recv() {
                variant = next.variant;
                waiters.push(next.reply);
            }

            // The variant may have become current between request and
            // processing (duplicate collapse).
            let already = shared
                .current
                .read()
                .as_ref()
                .filter(|c| c.variant == variant)
                .map(|c| ModelChange {
                    variant: c.variant.clone(),
                    device: c.device,
                });
            if let Some(change) = already {
                for waiter in waiters {
                    let _ = waiter.send(Ok(change.clone()));
                }
                continue;
            }

            let outcome = run_load(&shared, &factory, &variant).await;
            for waiter in waiters {
                let reply = match &outcome {
                    Ok(change) => Ok(change.clone()),
                    Err((variant, reason)) => Err(VerbatimError::ModelLoad {
                        variant: variant.clone(),
                        reason: reason.clone(),
                    }),
                };
                let _ = waiter.send(reply);
            }
        }
        debug!("loader task exiting — manager dropped");
    });

    tx
}

/// Run one load with the single CPU fallback. On failure the previous
/// backend is left untouched.
async fn run_load(
    shared: &Arc<Shared>,
    factory: &Arc<dyn BackendFactory>,
    variant: &str,
) -> std::result::Result<ModelChange, (String, String)> {
    let mut device = shared.preferred_device;
    info!(variant, %device, "loading model");

    let handle = match load_on(factory, variant, device).await {
        Ok(handle) => handle,
        Err(e) if device == Device::Gpu => {
            warn!(variant, error = %e, "accelerated load failed, retrying on cpu");
            device = Device::Cpu;
            match load_on(factory, variant, device).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!(variant, error = %e, "cpu fallback load failed");
                    return Err((variant.to_string(), e.to_string()));
                }
            }
        }
        Err(e) => {
            error!(variant, error = %e, "model load failed");
            return Err((variant.to_string(), e.to_string()));
        }
    };

    *shared.current.write() = Some(CurrentBackend {
        handle,
        variant: variant.to_string(),
        device,
    });
    info!(variant, %device, "model loaded");

    Ok(ModelChange {
        variant: variant.to_string(),
        device,
    })
}

async fn load_on(
    factory: &Arc<dyn BackendFactory>,
    variant: &str,
    device: Device,
) -> Result<BackendHandle> {
    let factory = Arc::clone(factory);
    let variant = variant.to_string();
    tokio::task::spawn_blocking(move || factory.load(&variant, device).map(BackendHandle::new))
        .await
        .map_err(|e| VerbatimError::Other(anyhow::anyhow!("model load task panicked: {e}")))?
}
