//! 编排集成测试：通过 ControlHandle 驱动循环，用脚本化应答者模拟 Agent

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use zoo::agent::{Outcome, Responder, TurnContext};
use zoo::core::{ControlHandle, Reply, RunOptions, RunState, StatusSnapshot, ZooEvent};
use zoo::llm::LlmError;
use zoo::memory::{ChannelStore, ConversationLog, MemoryChannelStore, Message};
use zoo::roster::{AgentId, AgentSpec, Roster};
use zoo::spawn_orchestrator;

#[derive(Clone)]
enum Step {
    Reply(&'static str),
    Pass,
    Fail,
    /// 等待 Notify 之后再回复
    Gate(Arc<Notify>, &'static str),
    /// 等待 Notify 之后返回错误
    GateFail(Arc<Notify>),
}

/// 一次调用看到的输入
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    agent: String,
    prompt: String,
    instructions: String,
}

#[derive(Clone, Copy)]
enum WhenDone {
    Echo,
    Pass,
    Fail,
}

/// 每个 Agent 按脚本依次应答，脚本用完后按 WhenDone 处理
struct ScriptedResponder {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    when_done: Mutex<HashMap<String, WhenDone>>,
    calls: Mutex<Vec<String>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedResponder {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            when_done: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn script(self, agent: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().insert(agent.to_string(), steps.into());
        self
    }

    fn when_done(self, agent: &str, behaviour: WhenDone) -> Self {
        self.when_done.lock().unwrap().insert(agent.to_string(), behaviour);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self, agent: &str) -> usize {
        self.calls().iter().filter(|c| *c == agent).count()
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, turn: &TurnContext, spec: &AgentSpec) -> Outcome {
        self.calls.lock().unwrap().push(spec.name.clone());
        self.seen.lock().unwrap().push(Seen {
            agent: spec.name.clone(),
            prompt: spec.prompt.clone(),
            instructions: turn.global_instructions.clone(),
        });
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&spec.name)
            .and_then(|steps| steps.pop_front());
        match step {
            Some(Step::Reply(text)) => Outcome::Message(text.to_string()),
            Some(Step::Pass) => Outcome::Pass,
            Some(Step::Fail) => Outcome::Error(LlmError::Api("boom".into())),
            Some(Step::Gate(gate, text)) => {
                gate.notified().await;
                Outcome::Message(text.to_string())
            }
            Some(Step::GateFail(gate)) => {
                gate.notified().await;
                Outcome::Error(LlmError::Api("boom".into()))
            }
            None => {
                let behaviour = self
                    .when_done
                    .lock()
                    .unwrap()
                    .get(&spec.name)
                    .copied()
                    .unwrap_or(WhenDone::Echo);
                match behaviour {
                    WhenDone::Echo => Outcome::Message(format!(
                        "{} replying to message {}",
                        spec.name,
                        turn.history.len()
                    )),
                    WhenDone::Pass => Outcome::Pass,
                    WhenDone::Fail => Outcome::Error(LlmError::Api("boom".into())),
                }
            }
        }
    }
}

/// 第 n 次追加（从 1 计）落在 `failing` 区间内时失败
struct FailingStore {
    appends: usize,
    failing: Range<usize>,
}

impl FailingStore {
    fn from(n: usize) -> Self {
        Self {
            appends: 0,
            failing: n..usize::MAX,
        }
    }

    fn only(n: usize) -> Self {
        Self {
            appends: 0,
            failing: n..n + 1,
        }
    }
}

impl ChannelStore for FailingStore {
    fn append(&mut self, _msg: &Message) -> std::io::Result<()> {
        self.appends += 1;
        if self.failing.contains(&self.appends) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        }
        Ok(())
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn memory_log() -> Arc<ConversationLog> {
    Arc::new(ConversationLog::open(Box::new(MemoryChannelStore::default())).unwrap())
}

fn roster(names: &[&str]) -> Roster {
    let specs = names
        .iter()
        .map(|name| AgentSpec::new(*name, format!("You are {}", name)).with_id(name.to_lowercase()))
        .collect();
    Roster::from_specs(specs).unwrap()
}

fn capped(cap: usize) -> RunOptions {
    RunOptions {
        max_messages: Some(cap),
        ..RunOptions::default()
    }
}

fn start(
    log: Arc<ConversationLog>,
    responder: Arc<ScriptedResponder>,
    names: &[&str],
    options: RunOptions,
) -> ControlHandle {
    let (handle, _task) = spawn_orchestrator(log, responder, roster(names), options);
    handle
}

async fn wait_for(handle: &ControlHandle, pred: impl Fn(&StatusSnapshot) -> bool) -> StatusSnapshot {
    let mut rx = handle.watch_status();
    let result = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s))).await;
    let snapshot = result
        .expect("timed out waiting for status")
        .expect("orchestrator exited");
    snapshot.clone()
}

async fn next_discarded(events: &mut broadcast::Receiver<ZooEvent>) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(ZooEvent::ResultDiscarded { agent }) => return agent,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("no discarded result")
}

async fn bodies(log: &ConversationLog) -> Vec<String> {
    log.snapshot().await.into_iter().map(|m| m.body).collect()
}

async fn authors(log: &ConversationLog) -> Vec<String> {
    log.snapshot()
        .await
        .iter()
        .map(|m| m.author.display_name().to_string())
        .collect()
}

#[tokio::test]
async fn test_todo_app_alternates_until_cap() {
    let log = memory_log();
    let responder = Arc::new(ScriptedResponder::new());
    let mut options = capped(4);
    options.first_agent = Some(AgentId::from("a"));
    let handle = start(log.clone(), responder, &["A", "B"], options);

    assert_eq!(handle.inject("Build a todo app").await.unwrap(), Reply::Appended(1));
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;

    assert_eq!(authors(&log).await, vec!["User", "A", "B", "A"]);
    let seqs: Vec<u64> = log.snapshot().await.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_pass_advances_turn_without_message() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(
        ScriptedResponder::new()
            .script("A", vec![Step::Pass])
            .script("B", vec![Step::Gate(gate.clone(), "B speaks")]),
    );
    let handle = start(log.clone(), responder.clone(), &["A", "B"], capped(2));

    handle.inject("hello").await.unwrap();
    let status = wait_for(&handle, |s| s.turn_holder.as_deref() == Some("B")).await;
    assert_eq!(status.stall_count, 1);
    assert_eq!(status.message_count, 1);

    gate.notify_one();
    let status = wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    assert_eq!(status.stall_count, 0);
    assert_eq!(authors(&log).await, vec!["User", "B"]);
    assert_eq!(responder.calls(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_repeated_failures_degrade_but_keep_turns() {
    let log = memory_log();
    let responder = Arc::new(
        ScriptedResponder::new()
            .script("C", vec![Step::Fail, Step::Fail])
            .when_done("C", WhenDone::Fail),
    );
    let handle = start(log.clone(), responder.clone(), &["A", "B", "C"], capped(10));

    handle.inject("go").await.unwrap();
    let status = wait_for(&handle, |s| s.run_state == RunState::Stopped).await;

    let c = status.agent("C").unwrap();
    assert!(c.degraded);
    assert_eq!(c.consecutive_errors, 4);
    assert!(!status.agent("A").unwrap().degraded);
    assert_eq!(responder.call_count("C"), 4);
    assert!(status.last_error.unwrap().contains("boom"));
    assert!(!authors(&log).await.iter().any(|a| a == "C"));
}

#[tokio::test]
async fn test_pause_during_call_keeps_result_and_holds_next_turn() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(
        ScriptedResponder::new().script("B", vec![Step::Gate(gate.clone(), "B finishes")]),
    );
    let handle = start(log.clone(), responder.clone(), &["A", "B"], RunOptions::default());

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("B")).await;
    handle.pause().await.unwrap();
    assert_eq!(handle.status().run_state, RunState::Paused);

    gate.notify_one();
    wait_for(&handle, |s| s.message_count == 3 && s.turn_holder.is_none()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.status();
    assert_eq!(status.run_state, RunState::Paused);
    assert_eq!(status.message_count, 3);
    assert_eq!(authors(&log).await, vec!["User", "A", "B"]);
    assert_eq!(responder.calls(), vec!["A", "B"]);

    handle.resume().await.unwrap();
    wait_for(&handle, |s| s.message_count >= 4).await;
    handle.stop().await.unwrap();
    assert_eq!(log.snapshot().await[3].author.display_name(), "A");
}

#[tokio::test]
async fn test_restart_clears_log_and_numbering() {
    let log = memory_log();
    let responder = Arc::new(ScriptedResponder::new());
    let handle = start(log.clone(), responder, &["A", "B"], RunOptions::default());

    handle.inject("first run").await.unwrap();
    wait_for(&handle, |s| s.message_count >= 3).await;

    handle.restart().await.unwrap();
    let status = handle.status();
    assert_eq!(status.run_state, RunState::Idle);
    assert_eq!(status.message_count, 0);
    assert!(log.is_empty().await);

    assert_eq!(handle.inject("second run").await.unwrap(), Reply::Appended(1));
    let first = log.snapshot().await[0].clone();
    assert_eq!(first.seq, 1);
    assert_eq!(first.body, "second run");
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_removed_agent_keeps_authorship() {
    let log = memory_log();
    let responder = Arc::new(ScriptedResponder::new());
    let handle = start(log.clone(), responder, &["A", "B", "C"], capped(4));

    handle.inject("hi").await.unwrap();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    assert_eq!(authors(&log).await, vec!["User", "A", "B", "C"]);

    handle.remove_agent("b").await.unwrap();
    let new_b = handle.add_agent(AgentSpec::new("B", "A different B")).await.unwrap();
    assert_ne!(new_b, AgentId::from("b"));

    let old = log.snapshot().await;
    assert_eq!(old[2].author.display_name(), "B");
    assert_eq!(old[2].author.agent_id(), Some(&AgentId::from("b")));

    handle.restart().await.unwrap();
    handle.inject("again").await.unwrap();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    let messages = log.snapshot().await;
    let names: Vec<&str> = messages.iter().map(|m| m.author.display_name()).collect();
    assert_eq!(names, vec!["User", "A", "C", "B"]);
    assert_eq!(messages[3].author.agent_id(), Some(&new_b));
}

#[tokio::test]
async fn test_stall_waits_for_user_then_resumes() {
    let log = memory_log();
    let responder = Arc::new(
        ScriptedResponder::new()
            .script("A", vec![Step::Pass, Step::Reply("back again")])
            .when_done("A", WhenDone::Pass)
            .when_done("B", WhenDone::Pass),
    );
    let mut events = {
        let handle = start(log.clone(), responder.clone(), &["A", "B"], RunOptions::default());
        let events = handle.subscribe();
        handle.inject("anyone?").await.unwrap();

        let status = wait_for(&handle, |s| s.run_state == RunState::AwaitingUser).await;
        assert!(status.pending_user_input);
        assert_eq!(status.stall_count, 2);
        assert_eq!(status.message_count, 1);

        assert_eq!(handle.inject("wake up").await.unwrap(), Reply::Appended(2));
        let status = wait_for(&handle, |s| s.message_count == 3 && s.run_state == RunState::AwaitingUser).await;
        assert_eq!(status.recent_messages.last().unwrap().body, "back again");
        assert_eq!(responder.calls(), vec!["A", "B", "A", "B", "A"]);
        events
    };

    let mut stalls = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ZooEvent::Stalled { .. }) {
            stalls += 1;
        }
    }
    assert_eq!(stalls, 2);
}

#[tokio::test]
async fn test_stop_discards_in_flight_result() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "too late")]));
    let handle = start(log.clone(), responder, &["A"], RunOptions::default());
    let mut events = handle.subscribe();

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    handle.stop().await.unwrap();
    gate.notify_one();

    assert_eq!(next_discarded(&mut events).await, "A");
    assert_eq!(authors(&log).await, vec!["User"]);
    assert!(handle.inject("hello?").await.is_err());
}

#[tokio::test]
async fn test_user_message_queued_while_agent_produces() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "A done")]));
    let handle = start(log.clone(), responder, &["A", "B"], capped(4));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    assert_eq!(handle.inject("hold on").await.unwrap(), Reply::Queued);
    assert_eq!(log.len().await, 1);

    gate.notify_one();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    let messages = log.snapshot().await;
    let names: Vec<&str> = messages.iter().map(|m| m.author.display_name()).collect();
    assert_eq!(names, vec!["User", "A", "User", "B"]);
    assert_eq!(messages[2].body, "hold on");
}

#[tokio::test]
async fn test_empty_roster_waits_until_agent_added() {
    let log = memory_log();
    let responder = Arc::new(ScriptedResponder::new());
    let handle = start(log.clone(), responder, &[], capped(2));

    handle.inject("is anyone here?").await.unwrap();
    let status = wait_for(&handle, |s| s.run_state == RunState::AwaitingUser).await;
    assert!(!status.pending_user_input);

    handle.add_agent(AgentSpec::new("Late", "Arrives late")).await.unwrap();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    assert_eq!(authors(&log).await, vec!["User", "Late"]);
}

#[tokio::test]
async fn test_write_failure_pauses_and_surfaces() {
    let log = Arc::new(ConversationLog::open(Box::new(FailingStore::from(2))).unwrap());
    let responder = Arc::new(ScriptedResponder::new());
    let handle = start(log.clone(), responder, &["A"], RunOptions::default());

    handle.inject("start").await.unwrap();
    let status = wait_for(&handle, |s| s.run_state == RunState::Paused).await;
    assert_eq!(status.message_count, 1);
    assert!(status.last_error.unwrap().contains("disk full"));
    assert_eq!(log.len().await, 1);
}

#[tokio::test]
async fn test_delay_is_cut_short_by_pause() {
    let log = memory_log();
    let responder = Arc::new(ScriptedResponder::new());
    let options = RunOptions {
        delay_secs: 60,
        ..RunOptions::default()
    };
    let handle = start(log.clone(), responder.clone(), &["A", "B"], options);

    handle.inject("slowly").await.unwrap();
    wait_for(&handle, |s| s.message_count == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(responder.calls(), vec!["A"]);

    // 暂停会立刻生效，而不是等延迟结束
    tokio::time::timeout(Duration::from_secs(1), handle.pause())
        .await
        .unwrap()
        .unwrap();
    handle.resume().await.unwrap();
    wait_for(&handle, |s| s.message_count == 3).await;
    assert_eq!(responder.calls(), vec!["A", "B"]);
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_queued_user_messages_survive_write_failure() {
    // 第 3 次追加（q1）失败
    let log = Arc::new(ConversationLog::open(Box::new(FailingStore::only(3))).unwrap());
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "A says hi")]));
    let handle = start(log.clone(), responder, &["A"], capped(5));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    assert_eq!(handle.inject("q1").await.unwrap(), Reply::Queued);
    assert_eq!(handle.inject("q2").await.unwrap(), Reply::Queued);

    gate.notify_one();
    let status = wait_for(&handle, |s| s.run_state == RunState::Paused).await;
    assert!(status.last_error.unwrap().contains("disk full"));
    assert_eq!(bodies(&log).await, vec!["start", "A says hi"]);

    handle.resume().await.unwrap();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    assert_eq!(
        bodies(&log).await,
        vec!["start", "A says hi", "q1", "q2", "A replying to message 4"]
    );
    let seqs: Vec<u64> = log.snapshot().await.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_user_message_after_failed_flush_keeps_order() {
    let log = Arc::new(ConversationLog::open(Box::new(FailingStore::only(3))).unwrap());
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "A says hi")]));
    let handle = start(log.clone(), responder, &["A"], capped(4));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    handle.inject("q1").await.unwrap();
    gate.notify_one();
    wait_for(&handle, |s| s.run_state == RunState::Paused).await;

    // 暂停中直接发出的消息排在之前保留的 q1 之后
    assert_eq!(handle.inject("q2").await.unwrap(), Reply::Appended(4));
    assert_eq!(bodies(&log).await, vec!["start", "A says hi", "q1", "q2"]);
}

#[tokio::test]
async fn test_edit_during_call_applies_from_next_turn() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "A before edit")]));
    let handle = start(log.clone(), responder.clone(), &["A", "B"], capped(4));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    handle
        .edit_agent("a", AgentSpec::new("Alpha", "You are Alpha now"))
        .await
        .unwrap();
    assert!(handle.status().agent("Alpha").is_some());

    gate.notify_one();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;

    let messages = log.snapshot().await;
    let names: Vec<&str> = messages.iter().map(|m| m.author.display_name()).collect();
    assert_eq!(names, vec!["User", "A", "B", "Alpha"]);
    assert_eq!(messages[1].author.agent_id(), Some(&AgentId::from("a")));
    assert_eq!(messages[3].author.agent_id(), Some(&AgentId::from("a")));

    let seen = responder.seen();
    assert_eq!(seen[0].prompt, "You are A");
    assert_eq!(seen[2].agent, "Alpha");
    assert_eq!(seen[2].prompt, "You are Alpha now");
}

#[tokio::test]
async fn test_global_instructions_apply_from_next_turn() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "A done")]));
    let handle = start(log.clone(), responder.clone(), &["A", "B"], capped(3));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    handle.set_global_instructions("Answer in one line.").await.unwrap();

    gate.notify_one();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;

    let instructions: Vec<(String, String)> = responder
        .seen()
        .into_iter()
        .map(|s| (s.agent, s.instructions))
        .collect();
    assert_eq!(
        instructions,
        vec![
            ("A".to_string(), String::new()),
            ("B".to_string(), "Answer in one line.".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_restart_discards_in_flight_result() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("A", vec![Step::Gate(gate.clone(), "stale")]));
    let handle = start(log.clone(), responder, &["A"], capped(2));
    let mut events = handle.subscribe();

    handle.inject("first").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("A")).await;
    handle.restart().await.unwrap();
    assert_eq!(handle.status().run_state, RunState::Idle);
    gate.notify_one();

    assert_eq!(next_discarded(&mut events).await, "A");
    assert!(log.is_empty().await);

    assert_eq!(handle.inject("fresh").await.unwrap(), Reply::Appended(1));
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;
    assert_eq!(bodies(&log).await, vec!["fresh", "A replying to message 1"]);
}

#[tokio::test]
async fn test_removing_turn_holder_keeps_its_result() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("B", vec![Step::Gate(gate.clone(), "B last words")]));
    let handle = start(log.clone(), responder.clone(), &["A", "B", "C"], capped(5));

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("B")).await;
    handle.remove_agent("b").await.unwrap();
    assert!(handle.status().agent("B").is_none());

    gate.notify_one();
    wait_for(&handle, |s| s.run_state == RunState::Stopped).await;

    let messages = log.snapshot().await;
    let names: Vec<&str> = messages.iter().map(|m| m.author.display_name()).collect();
    assert_eq!(names, vec!["User", "A", "B", "C", "A"]);
    assert_eq!(messages[2].body, "B last words");
    assert_eq!(messages[2].author.agent_id(), Some(&AgentId::from("b")));
    assert_eq!(responder.call_count("B"), 1);
}

#[tokio::test]
async fn test_removed_agent_failure_not_carried_to_new_agent() {
    let log = memory_log();
    let gate = Arc::new(Notify::new());
    let responder = Arc::new(ScriptedResponder::new().script("B", vec![Step::GateFail(gate.clone())]));
    let handle = start(log.clone(), responder, &["A", "B"], RunOptions::default());

    handle.inject("start").await.unwrap();
    wait_for(&handle, |s| s.turn_holder.as_deref() == Some("B")).await;
    handle.remove_agent("b").await.unwrap();
    gate.notify_one();
    wait_for(&handle, |s| s.last_error.is_some()).await;
    handle.stop().await.unwrap();

    handle
        .add_agent(AgentSpec::new("B", "Back again").with_id("b"))
        .await
        .unwrap();
    let status = handle.status();
    let b = status.agent("B").unwrap();
    assert_eq!(b.consecutive_errors, 0);
    assert!(!b.degraded);
}
