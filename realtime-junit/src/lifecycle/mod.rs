// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attaching tracking handles to builds and blocks as they start, and detaching them as they end.
//!
//! The [`BlockLifecycleManager`] owns every attached [`TrackingHandle`]. Handles are attached
//! through one of three paths:
//!
//! * whole builds, through [`on_build_started`](BlockLifecycleManager::on_build_started);
//! * workspace blocks of pipeline builds, through
//!   [`on_new_head`](BlockLifecycleManager::on_new_head);
//! * explicit realtime steps, through [`start_step`](BlockLifecycleManager::start_step) and
//!   [`finish_step`](BlockLifecycleManager::finish_step).
//!
//! After every attach or detach, the build's remaining handles are saved through the host.

mod listener;
mod step;

pub use step::*;

use crate::{
    archiver::ExternalArchiver,
    baseline::BaselineResolver,
    config::RealtimeConfig,
    errors::{AttachError, DisplayErrorChain},
    handle::{HandleConfig, RefreshPolicy, TrackingHandle, WorkspaceReportSource},
    host::{Build, BuildId, WorkspaceResolver},
    parser::ReportParser,
};
use indexmap::IndexMap;
use junit_report::Report;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// What a request for a handle's URL resolves to.
#[derive(Clone, Debug)]
pub enum Target {
    /// The current result of the handle.
    Result(Arc<Report>),

    /// The handle is attached, but has no results yet.
    Empty,

    /// No handle is attached at that URL.
    NotFound,

    /// The build has finished: its handles were detached and the caller should go to the build
    /// page instead.
    Redirect(String),
}

/// Owns the tracking handles attached to running builds.
#[derive(Debug)]
pub struct BlockLifecycleManager {
    parser: Arc<dyn ReportParser>,
    workspaces: Arc<dyn WorkspaceResolver>,
    archiver: Arc<dyn ExternalArchiver>,
    policy: RefreshPolicy,
    resolver: BaselineResolver,
    attached: Mutex<IndexMap<BuildId, Vec<Arc<TrackingHandle>>>>,
}

impl BlockLifecycleManager {
    /// Creates a new manager with no handles attached.
    pub fn new(
        config: &RealtimeConfig,
        parser: Arc<dyn ReportParser>,
        workspaces: Arc<dyn WorkspaceResolver>,
        archiver: Arc<dyn ExternalArchiver>,
    ) -> Self {
        Self {
            parser,
            workspaces,
            archiver,
            policy: RefreshPolicy::new(config.refresh()),
            resolver: BaselineResolver::new(config.baseline()),
            attached: Mutex::new(IndexMap::new()),
        }
    }

    /// Attaches a new handle to a build.
    ///
    /// Returns an error if a handle with the same URL name is already attached.
    pub fn attach(
        &self,
        build: Arc<dyn Build>,
        config: HandleConfig,
    ) -> Result<Arc<TrackingHandle>, AttachError> {
        let url_name = config.url_name();
        let handle = {
            let mut attached = self.lock();
            let handles = attached.entry(build.id().clone()).or_default();
            if handles.iter().any(|handle| handle.url_name() == url_name) {
                return Err(AttachError::Duplicate {
                    build: build.id().clone(),
                    url_name,
                });
            }

            let source = WorkspaceReportSource::new(
                build.clone(),
                config.clone(),
                self.parser.clone(),
                self.workspaces.clone(),
                self.resolver.clone(),
            );
            let handle = Arc::new(TrackingHandle::new(
                build.clone(),
                config,
                Box::new(source),
                self.policy.clone(),
            ));
            handles.push(handle.clone());
            handle
        };

        debug!("{}: attached {url_name}", build.id());
        self.save(build.as_ref());
        Ok(handle)
    }

    /// Detaches the handle with the given URL name from a build, if it is attached.
    pub fn detach(&self, build: &dyn Build, url_name: &str) -> Option<Arc<TrackingHandle>> {
        let handle = {
            let mut attached = self.lock();
            let handles = attached.get_mut(build.id())?;
            let index = handles
                .iter()
                .position(|handle| handle.url_name() == url_name)?;
            let handle = handles.remove(index);
            if handles.is_empty() {
                attached.shift_remove(build.id());
            }
            handle
        };

        handle.mark_detached();
        debug!("{}: detached {url_name}", build.id());
        self.save(build);
        Some(handle)
    }

    /// Detaches every handle from a build.
    pub fn detach_all(&self, build: &dyn Build) -> Vec<Arc<TrackingHandle>> {
        let handles = self.lock().shift_remove(build.id()).unwrap_or_default();
        if handles.is_empty() {
            return handles;
        }

        for handle in &handles {
            handle.mark_detached();
        }
        debug!("{}: detached {} handles", build.id(), handles.len());
        self.save(build);
        handles
    }

    /// The handles attached to a build, in the order they were attached.
    pub fn attached(&self, build: &BuildId) -> Vec<Arc<TrackingHandle>> {
        self.lock().get(build).cloned().unwrap_or_default()
    }

    /// The handle with the given URL name, if it is attached to the build.
    pub fn handle(&self, build: &BuildId, url_name: &str) -> Option<Arc<TrackingHandle>> {
        self.lock()
            .get(build)?
            .iter()
            .find(|handle| handle.url_name() == url_name)
            .cloned()
    }

    /// Resolves a request for a handle's URL.
    ///
    /// If the build has already finished, any handles still attached to it are dangling: they are
    /// detached and the caller is redirected to the build.
    pub fn target(&self, build: &dyn Build, url_name: &str) -> Target {
        if !build.is_building() {
            let dangling = self.detach_all(build);
            if !dangling.is_empty() {
                warn!(
                    "{}: dangling realtime test reports ({}) detached from finished build",
                    build.id(),
                    dangling
                        .iter()
                        .map(|handle| handle.url_name())
                        .collect::<Vec<_>>()
                        .join(", "),
                );
            }
            return Target::Redirect(build.url());
        }

        match self.handle(build.id(), url_name) {
            Some(handle) => match handle.result() {
                Some(result) => Target::Result(result),
                None => Target::Empty,
            },
            None => Target::NotFound,
        }
    }

    /// Re-attaches handles saved by an earlier process.
    ///
    /// Handles of builds that have finished in the meantime are dropped. Returns the number of
    /// handles attached.
    pub fn restore_handles(&self, build: Arc<dyn Build>, configs: Vec<HandleConfig>) -> usize {
        if !build.is_building() {
            if !configs.is_empty() {
                debug!(
                    "{}: build finished, dropping {} saved handles",
                    build.id(),
                    configs.len()
                );
                self.save(build.as_ref());
            }
            return 0;
        }

        let mut restored = 0;
        for config in configs {
            match self.attach(build.clone(), config) {
                Ok(_) => restored += 1,
                Err(err) => warn!("failed to restore handle: {err}"),
            }
        }
        restored
    }

    fn save(&self, build: &dyn Build) {
        let configs: Vec<_> = self
            .lock()
            .get(build.id())
            .map(|handles| {
                handles
                    .iter()
                    .map(|handle| handle.config().clone())
                    .collect()
            })
            .unwrap_or_default();

        if let Err(err) = build.save(&configs) {
            warn!(
                "{}: failed to save attached realtime test reports: {}",
                build.id(),
                DisplayErrorChain::new(&err)
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<BuildId, Vec<Arc<TrackingHandle>>>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
