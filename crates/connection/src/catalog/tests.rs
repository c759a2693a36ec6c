use std::sync::Arc;

use serde_json::Value;
use tokio::io::duplex;
use tokio::sync::oneshot;

use super::*;
use crate::connection::{Connection, ConnectionOptions};
use crate::object::ObjectSpec;
use crate::registry::TypeRegistry;
use crate::transport::PipeTransport;

fn test_connection() -> Connection {
	let (_stdin_read, stdin_write) = duplex(64);
	let (stdout_read, _stdout_write) = duplex(64);
	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let (connection, _actor) = Connection::new(
		transport.into_transport_parts(message_rx),
		Arc::new(TypeRegistry::any()),
		ConnectionOptions::default(),
	);
	connection
}

fn object(connection: &Connection, guid: &str, parent: &str, type_name: &str) -> Arc<RemoteObject> {
	Arc::new(RemoteObject::new(ObjectSpec {
		type_name: Arc::from(type_name),
		guid: Arc::from(guid),
		parent: Arc::from(parent),
		initializer: Value::Null,
		connection: connection.downgrade(),
	}))
}

fn catalog(connection: &Connection) -> Catalog {
	Catalog::new(Arc::new(RemoteObject::root(connection.downgrade())))
}

fn guids(objects: &[Arc<RemoteObject>]) -> Vec<&str> {
	objects.iter().map(|o| o.guid()).collect()
}

#[test]
fn test_new_catalog_holds_root() {
	let connection = test_connection();
	let catalog = catalog(&connection);

	assert_eq!(catalog.len(), 1);
	let root = catalog.get(ROOT_GUID).unwrap();
	assert!(root.is_root());
	assert!(root.parent_guid().is_none());
}

#[test]
fn test_insert_requires_known_parent() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	let err = catalog.insert(object(&connection, "g2", "missing", "X")).unwrap_err();
	assert!(err.to_string().contains("Parent object not found"));
	assert!(!catalog.contains("g2"));

	catalog.insert(object(&connection, "g1", ROOT_GUID, "X")).unwrap();
	assert!(catalog.insert(object(&connection, "g1", ROOT_GUID, "X")).is_err());
	assert_eq!(catalog.len(), 2);
}

#[test]
fn test_remove_subtree_is_recursive() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);
	catalog.insert(object(&connection, "g1", ROOT_GUID, "Browser")).unwrap();
	catalog.insert(object(&connection, "g2", "g1", "Page")).unwrap();
	catalog.insert(object(&connection, "g3", "g1", "Page")).unwrap();
	catalog.insert(object(&connection, "g4", "g2", "Frame")).unwrap();
	catalog.insert(object(&connection, "other", ROOT_GUID, "Browser")).unwrap();

	let removed = catalog.remove_subtree("g1").unwrap();

	assert_eq!(guids(&removed), vec!["g4", "g2", "g3", "g1"]);
	for guid in ["g1", "g2", "g3", "g4"] {
		assert!(!catalog.contains(guid), "{guid} should be gone");
	}
	assert!(catalog.contains("other"));
	assert_eq!(guids(&catalog.find(&Query::children_of(ROOT_GUID))), vec!["other"]);
}

#[test]
fn test_remove_unknown_and_root() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	assert!(catalog.remove_subtree("nope").unwrap().is_empty());
	assert!(catalog.remove_subtree(ROOT_GUID).is_err());
	assert!(catalog.contains(ROOT_GUID));
}

#[test]
fn test_find_modes() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);
	catalog.insert(object(&connection, "b1", ROOT_GUID, "Browser")).unwrap();
	catalog.insert(object(&connection, "p1", "b1", "Page")).unwrap();
	catalog.insert(object(&connection, "w1", "b1", "Worker")).unwrap();
	catalog.insert(object(&connection, "p2", "b1", "Page")).unwrap();

	let pages = catalog.find(&Query::children_of_type("b1", "Page"));
	assert_eq!(guids(&pages), vec!["p1", "p2"]);

	let first = catalog.find(&Query::children_of_type("b1", "Page").first(1));
	assert_eq!(guids(&first), vec!["p1"]);

	let children = catalog.find(&Query::children_of("b1"));
	assert_eq!(guids(&children), vec!["p1", "w1", "p2"]);

	assert_eq!(guids(&catalog.find(&Query::guid("w1"))), vec!["w1"]);
	assert!(catalog.find(&Query::children_of_type("b1", "Dialog")).is_empty());
	assert!(catalog.find(&Query::children_of("p1").first(0)).is_empty());
}

#[test]
fn test_empty_guid_selects_root() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);
	catalog.insert(object(&connection, "pw", ROOT_GUID, "Playwright")).unwrap();

	assert_eq!(guids(&catalog.find(&Query::children_of(""))), vec!["pw"]);
	assert_eq!(guids(&catalog.find(&Query::guid(""))), vec![ROOT_GUID]);
}

#[test]
fn test_all_waiters_resolved_on_insert() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	let (tx1, mut rx1) = oneshot::channel();
	let (tx2, mut rx2) = oneshot::channel();
	catalog.wait_for(Arc::from("g1"), tx1);
	catalog.wait_for(Arc::from("g1"), tx2);
	assert_eq!(catalog.waiting_on("g1"), 2);
	assert!(rx1.try_recv().is_err());

	catalog.insert(object(&connection, "g1", ROOT_GUID, "X")).unwrap();

	assert_eq!(rx1.try_recv().unwrap().guid(), "g1");
	assert_eq!(rx2.try_recv().unwrap().guid(), "g1");
	assert_eq!(catalog.waiting_on("g1"), 0);
}

#[test]
fn test_wait_for_existing_resolves_immediately() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	let (tx, mut rx) = oneshot::channel();
	catalog.wait_for(Arc::from(ROOT_GUID), tx);
	assert_eq!(rx.try_recv().unwrap().guid(), ROOT_GUID);
}

#[test]
fn test_abandoned_lookups_are_pruned() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	for i in 0..100 {
		let (tx, rx) = oneshot::channel();
		catalog.wait_for(Arc::from(format!("gone-{i}")), tx);
		drop(rx);
	}
	let (tx, _rx) = oneshot::channel();
	catalog.wait_for(Arc::from("live"), tx);

	assert_eq!(catalog.awaited_guids(), 1);
	assert_eq!(catalog.waiting_on("live"), 1);

	catalog.prune_waiters();
	assert_eq!(catalog.awaited_guids(), 1);
}

#[test]
fn test_clear_waiters_fails_callers() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);

	let (tx, mut rx) = oneshot::channel();
	catalog.wait_for(Arc::from("never"), tx);
	catalog.clear_waiters();

	assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
}

#[test]
fn test_reparent() {
	let connection = test_connection();
	let mut catalog = catalog(&connection);
	catalog.insert(object(&connection, "a", ROOT_GUID, "X")).unwrap();
	catalog.insert(object(&connection, "b", ROOT_GUID, "X")).unwrap();
	catalog.insert(object(&connection, "c", "a", "X")).unwrap();

	catalog.reparent("c", "b").unwrap();
	assert_eq!(catalog.get("c").unwrap().parent_guid().as_deref(), Some("b"));
	assert!(catalog.find(&Query::children_of("a")).is_empty());

	assert!(catalog.reparent("b", "c").is_err(), "adopting under a descendant must fail");
	assert!(catalog.reparent("missing", "a").is_err());
	assert!(catalog.reparent("c", "missing").is_err());
	assert!(catalog.reparent(ROOT_GUID, "a").is_err());
}
