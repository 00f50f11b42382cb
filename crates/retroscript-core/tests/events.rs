//! Event dispatch, the shared bus, suspension and cancellation of script contexts.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use retroscript_core::{run, Event, EventBus, RunOptions, ScriptContext, ScriptError};

fn collect_into(lines: &Rc<RefCell<Vec<String>>>) -> impl Fn(&str) + 'static {
    let sink = lines.clone();
    move |line: &str| sink.borrow_mut().push(line.to_string())
}

// ---------------------------------------------------------------------------
// Host-fired events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_host_dispatch_reaches_handler() {
    let mut ctx = ScriptContext::new("on saved { print \"saved \" + $event.file }", RunOptions::default()).unwrap();
    ctx.start().await.unwrap();
    assert!(ctx.output().is_empty());

    ctx.dispatch(Event::new("saved", serde_json::json!({"file": "a.txt"}))).await.unwrap();
    ctx.dispatch(Event::new("opened", serde_json::Value::Null)).await.unwrap();
    assert_eq!(ctx.output(), ["saved a.txt"]);
}

#[tokio::test]
async fn test_handler_state_persists_between_events() {
    let src = "set $clicks = 0\non click { set $clicks = $clicks + 1 }";
    let mut ctx = ScriptContext::new(src, RunOptions::default()).unwrap();
    ctx.start().await.unwrap();
    for _ in 0..3 {
        ctx.dispatch(Event::new("click", serde_json::Value::Null)).await.unwrap();
    }
    assert_eq!(ctx.variables()["clicks"], retroscript_core::Value::Number(3.0));
}

#[tokio::test]
async fn test_handler_errors_reported_to_callback() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let options = RunOptions::new().on_error(move |err| sink.borrow_mut().push(err.kind()));
    let mut ctx = ScriptContext::new("on go { print 1 / 0 }\non go { print fine }", options).unwrap();
    ctx.start().await.unwrap();

    ctx.dispatch(Event::new("go", serde_json::Value::Null)).await.unwrap();
    assert_eq!(ctx.output(), ["fine"]);
    assert_eq!(ctx.handler_errors().len(), 1);
    assert_eq!(*errors.borrow(), vec![Some(retroscript_core::ErrorKind::DivisionByZero)]);
}

#[tokio::test]
async fn test_handler_emits_are_handled_in_same_dispatch() {
    let src = "on first { emit second $event + 1 }\non second { print \"second got $event\" }";
    let mut ctx = ScriptContext::new(src, RunOptions::default()).unwrap();
    ctx.start().await.unwrap();
    ctx.dispatch(Event::new("first", serde_json::json!(1))).await.unwrap();
    assert_eq!(ctx.output(), ["second got 2"]);
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_emit_returns_through_own_subscription() {
    let bus = EventBus::new(16);
    let mut observer = bus.subscribe();
    let options = RunOptions::new().with_bus(bus.clone());
    let mut ctx = ScriptContext::new("on ping { print got $event }\nemit ping 7", options).unwrap();
    ctx.start().await.unwrap();

    assert_eq!(ctx.output(), ["got 7"]);
    let event = observer.try_recv().unwrap();
    assert_eq!(event.name, "ping");
    assert_eq!(event.payload, serde_json::json!(7));
    assert_eq!(event.source, Some(ctx.id()));
}

#[tokio::test]
async fn test_bus_connects_two_scripts() {
    let bus = EventBus::default();
    let mut listener =
        ScriptContext::new("on ping { print \"pong $event\" }", RunOptions::new().with_bus(bus.clone())).unwrap();
    let mut sender = ScriptContext::new("emit ping \"hi\"", RunOptions::new().with_bus(bus.clone())).unwrap();
    assert_eq!(bus.subscriber_count(), 2);

    listener.start().await.unwrap();
    sender.start().await.unwrap();
    assert!(sender.output().is_empty());

    // serve handles the waiting event, then keeps listening until the timeout
    let served = tokio::time::timeout(Duration::from_millis(50), listener.serve()).await;
    assert!(served.is_err());
    assert_eq!(listener.output(), ["pong hi"]);
}

#[tokio::test]
async fn test_events_published_before_start_are_delivered() {
    let bus = EventBus::default();
    let mut ctx = ScriptContext::new("on boot { print booted }", RunOptions::new().with_bus(bus.clone())).unwrap();
    bus.publish(Event::new("boot", serde_json::Value::Null));
    ctx.start().await.unwrap();
    assert_eq!(ctx.output(), ["booted"]);
}

#[tokio::test]
async fn test_run_with_bus() {
    let bus = EventBus::default();
    let options = RunOptions::new().with_bus(bus);
    let outcome = run("set $seen = 0\non tick { set $seen = $event }\nemit tick 42", options).await;
    assert!(outcome.success);
    assert_eq!(outcome.variables["seen"], retroscript_core::Value::Number(42.0));
}

#[tokio::test]
async fn test_serve_without_bus_returns_immediately() {
    let mut ctx = ScriptContext::new("print idle", RunOptions::default()).unwrap();
    ctx.start().await.unwrap();
    ctx.serve().await.unwrap();
}

// ---------------------------------------------------------------------------
// Suspension and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_wait_suspends_for_duration() {
    let started = tokio::time::Instant::now();
    let outcome = run("wait 5\nprint done", RunOptions::default()).await;
    assert_eq!(outcome.output, vec!["done"]);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_waiting_script_does_not_block_others() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let slow = run("wait 2\nprint slow", RunOptions::new().on_output(collect_into(&lines)));
    let fast = run("wait 1\nprint fast", RunOptions::new().on_output(collect_into(&lines)));

    let started = tokio::time::Instant::now();
    let (slow, fast) = tokio::join!(slow, fast);
    assert!(slow.success && fast.success);
    assert_eq!(*lines.borrow(), vec!["fast".to_string(), "slow".to_string()]);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_pending_wait() {
    let mut ctx = ScriptContext::new("print before\nwait 60\nprint after", RunOptions::default()).unwrap();
    let token = ctx.cancel_token();
    let cancel = async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    };

    let (result, ()) = tokio::join!(ctx.start(), cancel);
    assert!(matches!(result, Err(ScriptError::Cancelled)));
    assert_eq!(ctx.output(), ["before"]);
}

#[tokio::test]
async fn test_cancelled_context_stops_dispatch() {
    let mut ctx = ScriptContext::new("on go { print handled }", RunOptions::default()).unwrap();
    ctx.start().await.unwrap();
    ctx.cancel();
    assert!(ctx.is_cancelled());

    let result = ctx.dispatch(Event::new("go", serde_json::Value::Null)).await;
    assert!(matches!(result, Err(ScriptError::Cancelled)));
    assert!(ctx.output().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_serving() {
    let bus = EventBus::default();
    let mut ctx = ScriptContext::new("on ping { print pong }", RunOptions::new().with_bus(bus.clone())).unwrap();
    ctx.start().await.unwrap();
    let token = ctx.cancel_token();
    let cancel = async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    };

    let (result, ()) = tokio::join!(ctx.serve(), cancel);
    assert!(matches!(result, Err(ScriptError::Cancelled)));
}
