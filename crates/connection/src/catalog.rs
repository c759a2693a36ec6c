//! The local mirror of remote objects.
//!
//! Objects form a tree through their parent GUIDs; there is no child index, so
//! subtree removal and child lookups are linear scans in insertion order. The
//! catalog also holds the deferred lookups registered for GUIDs that have not been
//! created yet, and resolves every one of them on insertion.

use std::collections::HashMap;
use std::sync::Arc;

use pw_protocol::ROOT_GUID;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::object::{RemoteObject, normalize_guid};

/// Which objects a [`Query`] matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
	/// The object with exactly this GUID.
	Guid(Arc<str>),
	/// Children of `parent` whose type is `type_name`.
	ChildrenOfType { parent: Arc<str>, type_name: Arc<str> },
	/// All children of `parent`.
	ChildrenOf(Arc<str>),
}

impl Selector {
	pub fn matches(&self, object: &RemoteObject) -> bool {
		match self {
			Selector::Guid(guid) => object.guid() == guid.as_ref(),
			Selector::ChildrenOfType { parent, type_name } => {
				object.type_name() == type_name.as_ref() && object.parent_guid().as_deref() == Some(parent.as_ref())
			}
			Selector::ChildrenOf(parent) => object.parent_guid().as_deref() == Some(parent.as_ref()),
		}
	}
}

/// How many matches a [`Query`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
	/// At most `n` matches, in catalog order.
	First(usize),
	All,
}

/// Catalog filter used by `Connection::find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
	pub selector: Selector,
	pub take: Take,
}

impl Query {
	pub fn guid(guid: &str) -> Self {
		Self::all(Selector::Guid(normalize_guid(guid)))
	}

	pub fn children_of(parent: &str) -> Self {
		Self::all(Selector::ChildrenOf(normalize_guid(parent)))
	}

	pub fn children_of_type(parent: &str, type_name: &str) -> Self {
		Self::all(Selector::ChildrenOfType {
			parent: normalize_guid(parent),
			type_name: Arc::from(type_name),
		})
	}

	fn all(selector: Selector) -> Self {
		Self {
			selector,
			take: Take::All,
		}
	}

	/// Keeps only the first `n` matches.
	pub fn first(mut self, n: usize) -> Self {
		self.take = Take::First(n);
		self
	}

	fn limit(&self) -> usize {
		match self.take {
			Take::First(n) => n,
			Take::All => usize::MAX,
		}
	}
}

type Waiters = HashMap<Arc<str>, Vec<oneshot::Sender<Arc<RemoteObject>>>>;

/// GUID to proxy map rooted at [`ROOT_GUID`].
pub struct Catalog {
	objects: HashMap<Arc<str>, Arc<RemoteObject>>,
	order: Vec<Arc<str>>,
	waiters: Waiters,
}

impl Catalog {
	/// Creates a catalog holding only `root`.
	pub fn new(root: Arc<RemoteObject>) -> Self {
		let guid = root.guid_arc();
		Self {
			objects: HashMap::from([(Arc::clone(&guid), root)]),
			order: vec![guid],
			waiters: HashMap::new(),
		}
	}

	pub fn get(&self, guid: &str) -> Option<Arc<RemoteObject>> {
		self.objects.get(guid).cloned()
	}

	pub fn contains(&self, guid: &str) -> bool {
		self.objects.contains_key(guid)
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Adds `object` under its parent and resolves every deferred lookup for it.
	pub fn insert(&mut self, object: Arc<RemoteObject>) -> Result<()> {
		let guid = object.guid_arc();
		if self.objects.contains_key(&guid) {
			return Err(Error::ProtocolError(format!("Duplicate object: {guid}")));
		}
		match object.parent_guid() {
			Some(parent) if !self.objects.contains_key(&parent) => {
				return Err(Error::ProtocolError(format!("Parent object not found: {parent}")));
			}
			None => return Err(Error::ProtocolError(format!("Object without parent: {guid}"))),
			Some(_) => {}
		}

		self.objects.insert(Arc::clone(&guid), Arc::clone(&object));
		self.order.push(Arc::clone(&guid));

		if let Some(waiters) = self.waiters.remove(&guid) {
			tracing::debug!(guid = %guid, count = waiters.len(), "resolving deferred lookups");
			for waiter in waiters {
				let _ = waiter.send(Arc::clone(&object));
			}
		}
		Ok(())
	}

	/// Removes `guid` and every descendant, children before parents.
	///
	/// Returns the removed objects; unknown GUIDs remove nothing.
	pub fn remove_subtree(&mut self, guid: &str) -> Result<Vec<Arc<RemoteObject>>> {
		if guid == ROOT_GUID {
			return Err(Error::ProtocolError("Root object cannot be disposed".to_string()));
		}
		let mut removed = Vec::new();
		if self.objects.contains_key(guid) {
			self.remove_recursive(guid, &mut removed);
			self.order.retain(|g| self.objects.contains_key(g));
		}
		Ok(removed)
	}

	fn remove_recursive(&mut self, guid: &str, removed: &mut Vec<Arc<RemoteObject>>) {
		let children: Vec<Arc<str>> = self
			.order
			.iter()
			.filter(|g| {
				self.objects
					.get(*g)
					.and_then(|o| o.parent_guid())
					.is_some_and(|p| p.as_ref() == guid)
			})
			.cloned()
			.collect();

		for child in children {
			self.remove_recursive(&child, removed);
		}
		if let Some(object) = self.objects.remove(guid) {
			removed.push(object);
		}
	}

	/// Moves `child` under `new_parent`.
	pub fn reparent(&mut self, child: &str, new_parent: &str) -> Result<()> {
		let object = self
			.objects
			.get(child)
			.cloned()
			.ok_or_else(|| Error::ProtocolError(format!("Child object not found: {child}")))?;
		if object.is_root() {
			return Err(Error::ProtocolError("Root object cannot be adopted".to_string()));
		}
		if !self.objects.contains_key(new_parent) {
			return Err(Error::ProtocolError(format!("Parent object not found: {new_parent}")));
		}
		if self.is_ancestor_or_self(child, new_parent) {
			return Err(Error::ProtocolError(format!(
				"Cannot adopt {child} under its own descendant {new_parent}"
			)));
		}
		object.set_parent(normalize_guid(new_parent));
		Ok(())
	}

	fn is_ancestor_or_self(&self, ancestor: &str, guid: &str) -> bool {
		let mut current = Some(normalize_guid(guid));
		while let Some(g) = current {
			if g.as_ref() == ancestor {
				return true;
			}
			current = self.objects.get(&g).and_then(|o| o.parent_guid());
		}
		false
	}

	/// Objects matching `query`, in insertion order.
	pub fn find(&self, query: &Query) -> Vec<Arc<RemoteObject>> {
		self.order
			.iter()
			.filter_map(|g| self.objects.get(g))
			.filter(|o| query.selector.matches(o))
			.take(query.limit())
			.cloned()
			.collect()
	}

	/// Resolves `waiter` now if `guid` exists, otherwise on its creation.
	pub fn wait_for(&mut self, guid: Arc<str>, waiter: oneshot::Sender<Arc<RemoteObject>>) {
		match self.objects.get(&guid) {
			Some(object) => {
				let _ = waiter.send(Arc::clone(object));
			}
			None => {
				self.prune_waiters();
				self.waiters.entry(guid).or_default().push(waiter);
			}
		}
	}

	/// Forgets lookups whose callers stopped waiting.
	pub fn prune_waiters(&mut self) {
		self.waiters.retain(|_, waiters| {
			waiters.retain(|w| !w.is_closed());
			!waiters.is_empty()
		});
	}

	/// Number of GUIDs with at least one queued lookup.
	pub fn awaited_guids(&self) -> usize {
		self.waiters.len()
	}

	/// Number of callers still waiting for `guid` to be created.
	pub fn waiting_on(&self, guid: &str) -> usize {
		self.waiters.get(guid).map_or(0, |w| w.iter().filter(|w| !w.is_closed()).count())
	}

	/// Drops every deferred lookup, failing the waiting callers.
	pub fn clear_waiters(&mut self) {
		self.waiters.clear();
	}
}

#[cfg(test)]
mod tests;
