//! Soft and hard reload of loaded classes

use std::sync::Arc;

use quill_sdk::{ObjectId, Variant};
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use super::order::ReloadOrder;
use crate::class::{build, ClassDef, ClassDescription};
use crate::error::ReloadError;
use crate::instance::{Instance, InstanceId};
use crate::runtime::ScriptRuntime;

/// How live instances are carried across a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadMode {
    /// Instances stay attached and are rebound to the new definitions;
    /// values move by member name
    #[default]
    Soft,
    /// Instances are snapshotted, detached, re-attached to the new
    /// definitions and restored by replaying `set`
    Hard,
}

/// Outcome of a reload batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadReport {
    /// Rebuilt top-level paths, in build order
    pub rebuilt: Vec<String>,
    /// Owners carried over to a new definition
    pub restored: Vec<ObjectId>,
    /// Owners left alone: destroyed during the reload, or (soft) bound to a
    /// nested class that no longer exists
    pub skipped: Vec<ObjectId>,
    /// Owners that could not be re-attached, with the reason
    pub failed: Vec<(ObjectId, String)>,
}

type Generation = (Arc<ClassDef>, Option<Arc<ClassDef>>);

struct Snapshot {
    owner: ObjectId,
    instance: InstanceId,
    target: Option<Arc<ClassDef>>,
    placeholder: bool,
    state: Vec<(String, Variant)>,
}

/// Pair an old definition and its nested classes with their rebuilt
/// counterparts, matched by nested name
fn collect_generations(old: &Arc<ClassDef>, new: Option<&Arc<ClassDef>>, out: &mut Vec<Generation>) {
    out.push((old.clone(), new.cloned()));
    for (name, old_sub) in old.subclasses() {
        let new_sub = new.and_then(|n| n.subclass(name));
        collect_generations(old_sub, new_sub, out);
    }
}

impl ScriptRuntime {
    /// Replace the class at `path` with `description` and rebuild every
    /// loaded class inheriting from it
    pub fn reload_class(
        &mut self,
        path: &str,
        mut description: ClassDescription,
        mode: ReloadMode,
    ) -> Result<ReloadReport, ReloadError> {
        if !self.classes.contains(path) {
            return Err(ReloadError::UnknownClass(path.to_string()));
        }
        description.path = path.to_string();
        if description.name.is_empty() {
            description.name = path.to_string();
        }
        self.reload_batch(vec![path.to_string()], Some(description), mode)
    }

    /// Rebuild every loaded class from its last description
    pub fn reload_all(&mut self, mode: ReloadMode) -> Result<ReloadReport, ReloadError> {
        let roots = self.classes.paths();
        self.reload_batch(roots, None, mode)
    }

    /// `roots` plus every loaded class that builds against a class in the
    /// set, through its own base or a nested class's base, transitively
    fn affected_classes(&self, roots: Vec<String>, replacement: Option<&ClassDescription>) -> Vec<String> {
        let mut affected = roots;
        loop {
            let mut grew = false;
            for path in self.classes.paths() {
                if affected.contains(&path) {
                    continue;
                }
                let desc = match replacement {
                    Some(desc) if desc.path == path => Some(desc),
                    _ => self.classes.description(&path),
                };
                let depends = desc.map_or(false, |d| {
                    d.dependencies()
                        .into_iter()
                        .any(|dep| affected.iter().any(|a| a == dep))
                });
                if depends {
                    affected.push(path);
                    grew = true;
                }
            }
            if !grew {
                return affected;
            }
        }
    }

    fn reload_batch(
        &mut self,
        roots: Vec<String>,
        replacement: Option<ClassDescription>,
        mode: ReloadMode,
    ) -> Result<ReloadReport, ReloadError> {
        let affected = self.affected_classes(roots, replacement.as_ref());

        let mut descriptions: FxHashMap<String, ClassDescription> = FxHashMap::default();
        for path in &affected {
            let desc = match &replacement {
                Some(desc) if &desc.path == path => desc.clone(),
                _ => self
                    .classes
                    .description(path)
                    .cloned()
                    .ok_or_else(|| ReloadError::UnknownClass(path.clone()))?,
            };
            descriptions.insert(path.clone(), desc);
        }

        let mut order = ReloadOrder::new();
        for path in &affected {
            let deps = descriptions
                .get(path)
                .map(ClassDescription::dependencies)
                .unwrap_or_default();
            order.add(path, &deps);
        }
        let order = order.sort()?;

        // Stage every build before touching anything live
        let mut staged: FxHashMap<String, Arc<ClassDef>> = FxHashMap::default();
        for path in &order {
            let Some(desc) = descriptions.get(path) else {
                continue;
            };
            let def = {
                let classes = &self.classes;
                let staged_ref = &staged;
                let resolve = |p: &str| {
                    staged_ref
                        .get(p)
                        .cloned()
                        .or_else(|| classes.get(p).cloned())
                };
                build(desc, &resolve, &self.natives).map_err(|source| ReloadError::Build {
                    path: path.clone(),
                    source,
                })?
            };
            staged.insert(path.clone(), def);
        }

        let mut generations = Vec::new();
        for path in &order {
            if let Some(old) = self.classes.get(path) {
                collect_generations(old, staged.get(path), &mut generations);
            }
        }

        let mut report = ReloadReport {
            rebuilt: order.clone(),
            ..ReloadReport::default()
        };

        match mode {
            ReloadMode::Soft => {
                self.install_staged(&order, &mut descriptions, &mut staged);
                self.rebind_instances(&generations, &mut report);
            }
            ReloadMode::Hard => {
                let snapshots = self.snapshot_and_detach(&generations);
                self.install_staged(&order, &mut descriptions, &mut staged);
                self.restore_snapshots(snapshots, &mut report);
            }
        }

        info!(
            mode = ?mode,
            rebuilt = report.rebuilt.len(),
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "reload finished"
        );
        Ok(report)
    }

    fn install_staged(
        &mut self,
        order: &[String],
        descriptions: &mut FxHashMap<String, ClassDescription>,
        staged: &mut FxHashMap<String, Arc<ClassDef>>,
    ) {
        for path in order {
            if let (Some(desc), Some(def)) = (descriptions.remove(path), staged.remove(path)) {
                info!(path = %path, id = def.id().as_u64(), "reloaded class");
                self.classes.install(desc, def);
            }
        }
    }

    fn rebind_instances(&mut self, generations: &[Generation], report: &mut ReloadReport) {
        for (old, new) in generations {
            let ids: Vec<InstanceId> = old
                .instance_ids()
                .into_iter()
                .chain(old.placeholder_ids())
                .collect();
            for id in ids {
                let Some(instance) = self.instances.get_mut(&id) else {
                    continue;
                };
                let owner = instance.owner();
                match new {
                    Some(new) => {
                        instance.rebind(new.clone());
                        report.restored.push(owner);
                    }
                    None => {
                        warn!(
                            class = %old.path(),
                            name = %old.name(),
                            owner = %owner,
                            "nested class removed, instance keeps its previous definition"
                        );
                        report.skipped.push(owner);
                    }
                }
            }
        }
    }

    fn snapshot_and_detach(&mut self, generations: &[Generation]) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        for (old, new) in generations {
            for (ids, placeholder) in [(old.instance_ids(), false), (old.placeholder_ids(), true)] {
                for id in ids {
                    let Some(owner) = self.instances.get(&id).map(Instance::owner) else {
                        continue;
                    };
                    let state = self.property_state(id);
                    snapshots.push(Snapshot {
                        owner,
                        instance: id,
                        target: new.clone(),
                        placeholder,
                        state,
                    });
                }
            }
        }

        for snapshot in &snapshots {
            if self.script_instance(snapshot.owner) == Some(snapshot.instance) {
                self.detach(snapshot.owner);
            }
        }
        snapshots
    }

    fn restore_snapshots(&mut self, snapshots: Vec<Snapshot>, report: &mut ReloadReport) {
        for snapshot in snapshots {
            let owner = snapshot.owner;
            if !self.has_object(owner) {
                report.skipped.push(owner);
                continue;
            }
            let Some(target) = snapshot.target else {
                warn!(owner = %owner, "nested class removed, script not re-attached");
                report
                    .failed
                    .push((owner, "class no longer exists".to_string()));
                continue;
            };

            let attached = if snapshot.placeholder {
                self.attach_placeholder(owner, &target)
            } else {
                self.attach(owner, &target, &[])
            };
            match attached {
                Ok(id) => {
                    for (name, value) in snapshot.state {
                        self.set(id, &name, value);
                    }
                    report.restored.push(owner);
                }
                Err(err) => {
                    warn!(owner = %owner, class = %target.path(), error = %err, "failed to re-attach script after reload");
                    report.failed.push((owner, err.to_string()));
                }
            }
        }
    }
}
