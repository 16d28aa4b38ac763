//! The meeting watcher running against the in-memory document, the way it
//! runs inside a meeting page.

use meetstate::dom::{Document, Selector};
use meetstate::message::MeetingStateMessage;
use meetstate::watcher::{ChannelSender, DocumentMarker, MeetingStateWatcher};
use tokio::sync::mpsc::UnboundedReceiver;

type Watcher = MeetingStateWatcher<DocumentMarker, DocumentMarker, ChannelSender>;

fn setup() -> (Document, Watcher, UnboundedReceiver<MeetingStateMessage>) {
    let document = Document::new();
    let selector = Selector::parse(r#"[jsname="CQylAd"]"#).unwrap();
    let marker = DocumentMarker::new(document.clone(), selector);
    let (sender, rx) = ChannelSender::channel();
    let watcher = MeetingStateWatcher::new(marker.clone(), marker, sender);
    (document, watcher, rx)
}

fn drain(rx: &mut UnboundedReceiver<MeetingStateMessage>) -> Vec<bool> {
    let mut sent = Vec::new();
    while let Ok(message) = rx.try_recv() {
        sent.push(message.active);
    }
    sent
}

#[test]
fn test_page_without_meeting() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();

    let panel = document
        .append_element(document.body(), "div", &[("class", "lobby")])
        .unwrap();
    document.deliver_mutations();
    document.remove(panel).unwrap();
    document.deliver_mutations();

    assert_eq!(drain(&mut rx), vec![false]);
}

#[test]
fn test_join_then_leave() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();

    let main = document.append_element(document.body(), "main", &[]).unwrap();
    let call = document
        .append_element(main, "div", &[("jsname", "CQylAd")])
        .unwrap();
    document.deliver_mutations();
    assert_eq!(drain(&mut rx), vec![false, true]);

    document.remove(call).unwrap();
    document.deliver_mutations();
    assert_eq!(drain(&mut rx), vec![false]);
}

#[test]
fn test_already_in_meeting_at_load() {
    let (document, watcher, mut rx) = setup();
    document
        .append_element(document.body(), "div", &[("jsname", "CQylAd")])
        .unwrap();
    document.deliver_mutations();

    watcher.initialize().unwrap();
    assert_eq!(drain(&mut rx), vec![true]);
}

#[test]
fn test_new_consumer_without_change() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();
    watcher.on_external_trigger().unwrap();
    watcher.on_external_trigger().unwrap();
    document.deliver_mutations();

    assert_eq!(drain(&mut rx), vec![false]);
}

#[test]
fn test_marker_added_and_removed_between_deliveries() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();

    let call = document
        .append_element(document.body(), "div", &[("jsname", "CQylAd")])
        .unwrap();
    document.remove(call).unwrap();
    assert_eq!(document.deliver_mutations(), 1);

    assert_eq!(drain(&mut rx), vec![false]);
}

#[test]
fn test_attribute_only_change_waits_for_next_check() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();

    let host = document.append_element(document.body(), "div", &[]).unwrap();
    document.deliver_mutations();
    document.set_attribute(host, "jsname", "CQylAd").unwrap();
    assert_eq!(document.deliver_mutations(), 0);
    assert_eq!(drain(&mut rx), vec![false]);

    // Any later child mutation re-evaluates the whole document.
    document.append_element(document.body(), "span", &[]).unwrap();
    document.deliver_mutations();
    assert_eq!(drain(&mut rx), vec![true]);
}

#[test]
fn test_dropping_watcher_disconnects_observer() {
    let (document, watcher, mut rx) = setup();
    watcher.initialize().unwrap();
    assert_eq!(document.observer_count(), 1);

    drop(watcher);
    assert_eq!(document.observer_count(), 0);

    document
        .append_element(document.body(), "div", &[("jsname", "CQylAd")])
        .unwrap();
    assert_eq!(document.deliver_mutations(), 0);
    assert_eq!(drain(&mut rx), vec![false]);
}
