//! End-to-end sessions driven over an in-memory duplex pipe.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use wherehoo::protocol::{LineChannel, SessionLimits, TransportError};
use wherehoo::server::{serve, Peer};
use wherehoo::store::{sign_payload, MemoryStore};

const SECRET: &[u8] = b"s3cret";
const HEADER: &str = "wherehoo_server 0.85 2 12 1024 65535";

fn limits() -> SessionLimits {
    SessionLimits::default().with_idle_timeout(Duration::from_secs(2))
}

fn store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_identity("alice", SECRET)
            .with_protocol("HTTP"),
    )
}

fn peer() -> Peer {
    Peer {
        server_addr: "127.0.0.1:5650".to_string(),
        client_addr: "127.0.0.1:40001".to_string(),
    }
}

fn channel(limits: &SessionLimits) -> (LineChannel, DuplexStream) {
    let (server, client) = duplex(256 * 1024);
    let (read, write) = tokio::io::split(server);
    (
        LineChannel::new(BufReader::new(read), write, limits.idle_timeout),
        client,
    )
}

/// Writes the whole client script up front, runs one session and returns
/// everything the server wrote.
async fn run(store: &MemoryStore, script: &[u8]) -> (Result<(), TransportError>, String) {
    let limits = limits();
    let (mut chan, mut client) = channel(&limits);
    client.write_all(script).await.unwrap();

    let result = serve(&mut chan, store, &limits, &peer()).await;
    drop(chan);

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    (result, out)
}

fn insert_script(llh: &str, payload: &[u8]) -> Vec<u8> {
    let mut script = format!(
        "IDT alice\nACT insert\nPRO http\nMIM text/plain\nLLH {}\nMET corner cafe\nSHA x\nDAT {}\n",
        llh,
        payload.len()
    )
    .into_bytes();
    script.extend_from_slice(payload);
    script.extend_from_slice(&sign_payload(payload, SECRET));
    script.extend_from_slice(b".\n");
    script
}

/// Inserts a record and returns its uid.
async fn insert(store: &MemoryStore, llh: &str) -> String {
    let (result, out) = run(store, &insert_script(llh, b"hello")).await;
    result.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 6, "unexpected output: {:?}", out);
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[1], "ACK");
    assert_eq!(lines[2], "ACK");
    assert_eq!(&lines[4..], [".", "BYE"]);
    lines[3].to_string()
}

const CAFE: &str =
    "42.3601 -71.0942 0 42.3601 -71.0930 0 42.3610 -71.0930 0 42.3610 -71.0942 0";
const NEAR_CAFE: &str = "42.3600 -71.0936 0";

#[tokio::test]
async fn test_insert_without_fields_names_every_missing_one() {
    let store = store();
    let (result, out) = run(&store, b"ACT insert\n.\n").await;
    result.unwrap();
    assert_eq!(out, "NAK IDT PRO LLH DAT SHA\n.\nBYE\n");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_query_without_shape_or_location() {
    let store = store();
    let (_, out) = run(&store, b"act QUERY\n.\n").await;
    assert_eq!(out, "NAK SHP LLH\n.\nBYE\n");
}

#[tokio::test]
async fn test_unknown_command_ends_session_without_operation() {
    let store = store();
    let (result, out) = run(&store, b"IDT alice\nACT count\nXYZZY\n.\n").await;
    result.unwrap();
    assert_eq!(out, format!("{}\n.\nBYE\n", HEADER));
}

#[tokio::test]
async fn test_bye_and_nop() {
    let store = store();
    let (_, out) = run(&store, b"NOP\n\nBYE\n").await;
    assert_eq!(out, "ACK\n.\nBYE\n");
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let store = store();
    let (result, out) = run(&store, b"IDT alice\n").await;
    // the client keeps its end open, so the session ends on the idle timeout
    assert!(matches!(result, Err(TransportError::IdleTimeout(_))));
    assert_eq!(out, format!("{}\n", HEADER));
}

#[tokio::test]
async fn test_insert_search_count_delete() {
    let store = store();
    let uid = insert(&store, CAFE).await;
    assert_eq!(uid.len(), 64);
    assert_eq!(store.authority(&uid).as_deref(), Some("alice"));

    let search = format!(
        "ACT query\nLLH {}\nSHP rect_ctr\nRAD 500\n.\nmeta\ndata\nstop\n",
        NEAR_CAFE
    );
    let (result, out) = run(&store, search.as_bytes()).await;
    result.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "ACK");
    let header: Vec<&str> = lines[1].split(' ').collect();
    assert_eq!(header[1], "N");
    let distance: i64 = header[2].parse().unwrap();
    assert!((5..=20).contains(&distance), "distance {}", distance);
    assert_eq!(&header[3..], ["99999999", "5", "HTTP", "text/plain", "META"]);
    assert_eq!(lines[2], "corner cafe");
    assert_eq!(&lines[3..], ["hello.", "BYE"]);

    let count = format!("ACT count\nLLH {}\nSHP rect_ctr\nRAD 500\nLIM 0\n.\n", NEAR_CAFE);
    let (_, out) = run(&store, count.as_bytes()).await;
    assert_eq!(out, "ACK\n1\n.\nBYE\n");

    let far = "ACT count\nLLH -33.9 18.4 0\nSHP rect_ctr\nRAD 500\n.\n";
    let (_, out) = run(&store, far.as_bytes()).await;
    assert_eq!(out, "ACK\n0\n.\nBYE\n");

    let delete = format!("IDT alice\nACT delete\nUID {}\n.\n", uid);
    let (_, out) = run(&store, delete.as_bytes()).await;
    assert_eq!(out, format!("{}\nACK\nACK\n.\nBYE\n", HEADER));
    assert!(store.is_empty());

    let (_, out) = run(&store, delete.as_bytes()).await;
    assert_eq!(out, format!("{}\nNAK UID\n.\nBYE\n", HEADER));
}

#[tokio::test]
async fn test_forward_rectangle_search() {
    let store = store();
    insert(&store, CAFE).await;

    // standing south of the cafe looking north, then looking south
    let north = "ACT count\nLLH 42.3590 -71.0936 0\nSHP rect_fwd\nHDG 0\nWID 200\nLEN 400\n.\n";
    let (_, out) = run(&store, north.as_bytes()).await;
    assert_eq!(out, "ACK\n1\n.\nBYE\n");

    let south = north.replace("HDG 0", "HDG 180");
    let (_, out) = run(&store, south.as_bytes()).await;
    assert_eq!(out, "ACK\n0\n.\nBYE\n");
}

#[tokio::test]
async fn test_search_filters_by_mimetype_and_meta() {
    let store = store();
    insert(&store, CAFE).await;

    let base = format!("ACT count\nLLH {}\nSHP rect_ctr\nRAD 500\n", NEAR_CAFE);
    for (extra, expected) in [
        ("MIM text/plain\n", "1"),
        ("MIM image/png\n", "0"),
        ("MET cafe\n", "1"),
        ("MET bakery\n", "0"),
        ("PRO http\n", "1"),
    ] {
        let script = format!("{}{}.\n", base, extra);
        let (_, out) = run(&store, script.as_bytes()).await;
        assert_eq!(out, format!("ACK\n{}\n.\nBYE\n", expected), "filter {:?}", extra);
    }

    let script = format!("{}PRO gopher\n.\n", base);
    let (_, out) = run(&store, script.as_bytes()).await;
    assert_eq!(out, "NAK PRO\n.\nBYE\n");
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let store = store();
    let mut script = insert_script(CAFE, b"hello");
    // corrupt the first payload byte after the signature was computed
    let pos = script.windows(6).position(|w| w == b"DAT 5\n").unwrap() + 6;
    script[pos] = b'j';

    let (_, out) = run(&store, &script).await;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(&lines[1..], ["ACK", "NAK SHA", ".", "BYE"]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_crossing_insert_found_from_both_sides() {
    let store = store();
    let uid = insert(
        &store,
        "10 -0.001 0 10 0.001 0 10.001 0.001 0 10.001 -0.001 0",
    )
    .await;
    assert_eq!(store.geometries(&uid).map(|g| g.len()), Some(2));

    for location in ["10.0005 0.0005 0", "10.0005 -0.0005 0"] {
        let script = format!("ACT count\nLLH {}\nSHP rect_ctr\nRAD 50\n.\n", location);
        let (_, out) = run(&store, script.as_bytes()).await;
        assert_eq!(out, "ACK\n1\n.\nBYE\n", "searching from {}", location);
    }
}

#[tokio::test]
async fn test_short_lived_insert_rejected() {
    let store = store();
    let mut script = b"END 0 0 0 0 0 5\n".to_vec();
    script.extend(insert_script(CAFE, b"hello"));
    let (_, out) = run(&store, &script).await;
    assert!(out.contains("NAK END\n"), "unexpected output: {:?}", out);
}

/// Runs an insert whose payload is split around the `DAT` deadline: `early`
/// arrives in time, `late` plus the signature only after the deadline.
async fn late_payload_session(
    payload: &[u8],
    split: usize,
) -> (Result<(), TransportError>, String) {
    let store = store();
    let limits = limits()
        .with_idle_timeout(Duration::from_secs(200))
        .with_data_timeout(Duration::from_secs(30));
    let (mut chan, mut client) = channel(&limits);

    let task_store = Arc::clone(&store);
    let task_limits = limits.clone();
    let session = tokio::spawn(async move {
        let result = serve(&mut chan, task_store.as_ref(), &task_limits, &peer()).await;
        drop(chan);
        result
    });

    let (early, late) = payload.split_at(split);
    let mut head = format!(
        "IDT alice\nACT insert\nPRO http\nLLH {}\nSHA x\nDAT {}\n",
        CAFE,
        payload.len()
    )
    .into_bytes();
    head.extend_from_slice(early);
    client.write_all(&head).await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;

    let mut tail = late.to_vec();
    tail.extend_from_slice(&sign_payload(payload, SECRET));
    tail.extend_from_slice(b".\n");
    client.write_all(&tail).await.unwrap();

    let result = session.await.unwrap();
    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    assert!(store.is_empty());
    (result, out)
}

#[tokio::test(start_paused = true)]
async fn test_payload_deadline_marks_dat() {
    let (result, out) = late_payload_session(b"hello", 3).await;
    result.unwrap();
    assert_eq!(
        out,
        "wherehoo_server 0.85 200 12 1024 65535\nNAK DAT SHA\n.\nBYE\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_payload_tail_is_not_read_as_commands() {
    // without draining, the tail would end the session through its BYE line
    let (result, out) = late_payload_session(b"x\nBYE\nIDT mallory\n", 1).await;
    result.unwrap();
    assert_eq!(
        out,
        "wherehoo_server 0.85 200 12 1024 65535\nNAK DAT SHA\n.\nBYE\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_unfinished_payload_block_times_out() {
    let store = store();
    let limits = limits()
        .with_idle_timeout(Duration::from_secs(200))
        .with_data_timeout(Duration::from_secs(30));
    let (mut chan, mut client) = channel(&limits);
    client
        .write_all(b"IDT alice\nACT insert\nDAT 5\nhel")
        .await
        .unwrap();

    // the declared block never completes, so the `.` is swallowed with it
    let peer_addr = peer();
    let session = serve(&mut chan, store.as_ref(), &limits, &peer_addr);
    let (result, _) = tokio::join!(session, async {
        tokio::time::sleep(Duration::from_secs(31)).await;
        client.write_all(b".\n").await.unwrap();
    });
    assert!(matches!(result, Err(TransportError::IdleTimeout(_))));
}
