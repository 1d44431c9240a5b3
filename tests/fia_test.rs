mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{harness, start};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use vxml::error::PlatformError;
use vxml::event::{EventSender, HANGUP};
use vxml::model::{Action, Choice, Document, Form, FormItem, GotoTarget, Menu, Prompt, VariableDecl};
use vxml::platform::{CollectRequest, CollectResult, Collector, Platform, TracingPlayer};
use vxml::{Interpreter, InterpreterState, StaticDocumentParser, StatusCode, Value};

#[tokio::test]
async fn test_handled_nomatch_does_not_count_attempts() {
    let document = Document::new("h.vxml").with_dialog(
        Form::new("f").with_item(
            FormItem::field("color")
                .with_prompt(Prompt::text("Which color?"))
                .with_prompt(Prompt::text("Say red or blue."))
                .with_handler("nomatch", vec![Action::Prompt(Prompt::text("Sorry."))]),
        ),
    );
    let mut h = harness(
        document,
        vec![
            CollectResult::NoMatch,
            CollectResult::Recognized(Value::from("red")),
        ],
    );
    start(&mut h, "h.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::Success);

    let requests = h.collector.requests().await;
    assert_eq!(requests[0].prompts.as_slice(), &["Which color?".to_string()]);
    // Handler output only; the field prompt is not replayed without <reprompt>.
    assert_eq!(requests[1].prompts.as_slice(), &["Sorry.".to_string()]);
    let session = h.interpreter.session().unwrap();
    assert_eq!(session.item("color").unwrap().value, Value::from("red"));
}

#[tokio::test]
async fn test_reprompt_replays_current_tier() {
    let document = Document::new("r.vxml").with_dialog(
        Form::new("f")
            .with_item(
                FormItem::field("color")
                    .with_prompt(Prompt::text("Which color?"))
                    .with_prompt(Prompt::text("Say red or blue.")),
            )
            .with_handler(
                "noinput",
                vec![Action::Prompt(Prompt::text("I didn't hear you.")), Action::Reprompt],
            ),
    );
    let mut h = harness(
        document,
        vec![CollectResult::NoInput, CollectResult::Recognized(Value::from("blue"))],
    );
    start(&mut h, "r.vxml").await;

    h.interpreter.run().await.unwrap();

    let requests = h.collector.requests().await;
    assert_eq!(
        requests[1].prompts.as_slice(),
        &["I didn't hear you.".to_string(), "Which color?".to_string()]
    );
}

#[tokio::test]
async fn test_attempts_reset_when_item_changes() {
    let document = Document::new("a.vxml").with_dialog(
        Form::new("f")
            .with_item(FormItem::field("first").with_prompt(Prompt::text("First?")))
            .with_item(
                FormItem::field("second")
                    .with_prompt(Prompt::text("Second?"))
                    .with_prompt(Prompt::text("Second, again?")),
            ),
    );
    let mut h = harness(
        document,
        vec![
            CollectResult::NoInput,
            CollectResult::NoInput,
            CollectResult::Recognized(Value::from("1")),
            CollectResult::NoInput,
        ],
    );
    start(&mut h, "a.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::UserHangup);
    let session = h.interpreter.session().unwrap();
    assert_eq!(session.attempts("first"), Some(0));
    assert_eq!(session.attempts("second"), Some(1));
    let requests = h.collector.requests().await;
    assert_eq!(requests[3].prompts.as_slice(), &["Second?".to_string()]);
    assert_eq!(requests[4].prompts.as_slice(), &["Second, again?".to_string()]);
}

#[tokio::test]
async fn test_filled_actions_clear_and_goto_nextitem() {
    let document = Document::new("c.vxml").with_dialog(
        Form::new("f")
            .with_variable(VariableDecl::new("tries", Some("0")))
            .with_item(
                FormItem::field("pin").with_action(Action::If {
                    branches: vec![vxml::model::ConditionalBranch {
                        cond: "pin != '1234'".to_string(),
                        actions: vec![
                            Action::Assign {
                                name: "tries".to_string(),
                                expr: "tries + 1".to_string(),
                            },
                            Action::Clear {
                                names: vec!["pin".to_string()],
                            },
                        ],
                    }],
                    otherwise: vec![Action::Goto(GotoTarget::Item("done".to_string()))],
                }),
            )
            .with_item(FormItem::block("done").with_action(Action::Log(
                Prompt::text("accepted after ").with_value("tries"),
            ))),
    );
    let mut h = harness(
        document,
        vec![
            CollectResult::Recognized(Value::from("0000")),
            CollectResult::Recognized(Value::from("1234")),
        ],
    );
    start(&mut h, "c.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::Success);
    let session = h.interpreter.session().unwrap();
    assert_eq!(
        session.scope().get(&vxml::ScopeLevel::DIALOG_CHAIN, "tries"),
        Value::Number(1.0)
    );
    assert!(session.item("done").unwrap().filled);
}

#[tokio::test]
async fn test_document_handler_catches_hangup() {
    let document = Document::new("d.vxml")
        .with_dialog(Form::new("f").with_item(FormItem::field("x")))
        .with_handler(
            "connection.disconnect",
            vec![Action::Prompt(Prompt::text("Goodbye.")), Action::Exit],
        );
    let mut h = harness(document, vec![CollectResult::Hangup]);
    start(&mut h, "d.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::ExitRequested);
    assert_eq!(h.player.played().await, vec!["Goodbye."]);
}

#[tokio::test]
async fn test_menu_transitions_to_form() {
    let document = Document::new("m.vxml")
        .with_dialog(
            Menu::new("main")
                .with_prompt(Prompt::text("Say weather or news."))
                .with_choice(Choice::new("weather", "#weather").with_dtmf("1"))
                .with_choice(Choice::new("news", "#news").with_dtmf("2")),
        )
        .with_dialog(Form::new("news").with_item(FormItem::field("topic")))
        .with_dialog(
            Form::new("weather").with_item(
                FormItem::field("city").with_prompt(Prompt::text("Which city?")),
            ),
        );
    let mut h = harness(
        document,
        vec![
            CollectResult::Recognized(Value::from("1")),
            CollectResult::Recognized(Value::from("Paris")),
        ],
    );
    start(&mut h, "m.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::Success);
    let session = h.interpreter.session().unwrap();
    assert_eq!(session.dialog_index(), Some(2));
    assert_eq!(session.item("city").unwrap().value, Value::from("Paris"));
    let requests = h.collector.requests().await;
    assert_eq!(requests[1].prompts.as_slice(), &["Which city?".to_string()]);
}

#[tokio::test]
async fn test_goto_unknown_dialog_is_badfetch() {
    let document = Document::new("g.vxml").with_dialog(
        Form::new("f").with_item(
            FormItem::block("jump").with_action(Action::Goto(GotoTarget::dialog("#nowhere"))),
        ),
    );
    let mut h = harness(document, vec![]);
    start(&mut h, "g.vxml").await;

    let err = h.interpreter.run().await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::EventNotHandled);
    assert_eq!(h.interpreter.state(), InterpreterState::Error);
}

#[tokio::test]
async fn test_handle_event_between_runs() {
    let document = Document::new("e.vxml").with_dialog(
        Form::new("f")
            .with_item(FormItem::field("x"))
            .with_handler("help", vec![Action::Prompt(Prompt::text("Say anything."))]),
    );
    let mut h = harness(document, vec![]);
    start(&mut h, "e.vxml").await;

    assert!(h.interpreter.handle_event("help", None).unwrap());
    assert_eq!(h.interpreter.last_status(), StatusCode::Success);
    assert!(!h.interpreter.handle_event("nomatch", None).unwrap());
    assert_eq!(h.interpreter.last_status(), StatusCode::NoMatch);
    assert_eq!(h.interpreter.state(), InterpreterState::DialogActive);

    assert!(!h.interpreter.handle_event(HANGUP, None).unwrap());
    assert_eq!(h.interpreter.state(), InterpreterState::Complete);
    assert_eq!(h.interpreter.last_status(), StatusCode::UserHangup);
}

/// Never answers; the collect only ends when it is superseded.
struct SilentCollector;

#[async_trait]
impl Collector for SilentCollector {
    async fn begin_collect(&self, _request: CollectRequest) -> Result<CollectResult, PlatformError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_external_event_supersedes_collect() {
    let document = Document::new("s.vxml").with_dialog(
        Form::new("f")
            .with_item(FormItem::field("x"))
            .with_handler("cancel", vec![Action::Prompt(Prompt::text("Cancelled.")), Action::Exit]),
    );
    let mut interpreter = Interpreter::new(
        Arc::new(StaticDocumentParser::new().with_document(document)),
        Platform::new(Arc::new(SilentCollector), Arc::new(TracingPlayer::new())),
    );
    interpreter.load_document("s.vxml").await.unwrap();
    interpreter.initialize().unwrap();

    let sender: EventSender = interpreter.event_sender();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.send("cancel", None).await.unwrap();
    });
    let status = tokio::time::timeout(Duration::from_secs(5), interpreter.run())
        .await
        .expect("run should finish once the event arrives")
        .unwrap();

    assert_eq!(status, StatusCode::ExitRequested);
    assert!(!interpreter.session().unwrap().collect_in_flight());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_attempts_count_unhandled_reserved_events(
        script in prop::collection::vec(prop_oneof![Just(CollectResult::NoInput), Just(CollectResult::NoMatch)], 0..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let expected = script.len() as u32;
        let attempts = runtime.block_on(async move {
            let document = Document::new("p.vxml")
                .with_dialog(Form::new("f").with_item(FormItem::field("x")));
            let mut h = harness(document, script);
            start(&mut h, "p.vxml").await;
            h.interpreter.run().await.unwrap();
            h.interpreter.session().unwrap().attempts("x")
        });
        prop_assert_eq!(attempts, Some(expected));
    }
}
