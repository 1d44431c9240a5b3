mod common;

use std::sync::Arc;

use common::{harness, start};
use pretty_assertions::assert_eq;
use vxml::event::handler::EventHandlerTable;
use vxml::event::Handler;
use vxml::model::{Action, Document, Form, FormItem, Prompt, VariableDecl};
use vxml::platform::CollectResult;
use vxml::{InterpreterError, InterpreterState, StatusCode, Value};

#[tokio::test]
async fn test_noinput_twice_then_hangup() {
    let document = Document::new("test.vxml").with_dialog(
        Form::new("testForm").with_item(
            FormItem::field("userInput")
                .with_prompt(Prompt::text("Please say something."))
                .with_prompt(Prompt::text("I still need an answer.")),
        ),
    );
    let mut h = harness(
        document,
        vec![
            CollectResult::NoInput,
            CollectResult::NoInput,
            CollectResult::Hangup,
        ],
    );
    start(&mut h, "test.vxml").await;

    let status = h.interpreter.run().await.unwrap();

    assert_eq!(status, StatusCode::UserHangup);
    assert_eq!(h.interpreter.last_status(), StatusCode::UserHangup);
    assert_eq!(h.interpreter.state(), InterpreterState::Complete);
    assert!(h.interpreter.is_complete());

    let session = h.interpreter.session().unwrap();
    assert_eq!(session.attempts("userInput"), Some(2));

    let requests = h.collector.requests().await;
    let prompts: Vec<_> = requests
        .iter()
        .map(|r| r.prompts.as_slice().to_vec())
        .collect();
    assert_eq!(
        prompts,
        vec![
            vec!["Please say something.".to_string()],
            vec!["I still need an answer.".to_string()],
            vec!["I still need an answer.".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_selection_follows_declaration_order() {
    let document = Document::new("order.vxml")
        .with_variable(VariableDecl::new("preset", Some("true")))
        .with_dialog(
            Form::new("f")
                .with_item(FormItem::field("A").with_guard("false"))
                .with_item(FormItem::field("B").with_guard("preset")),
        );
    let mut h = harness(document, vec![CollectResult::Recognized(Value::from("yes"))]);
    start(&mut h, "order.vxml").await;

    let status = h.interpreter.run().await.unwrap();

    assert_eq!(status, StatusCode::Success);
    let requests = h.collector.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].item, "A");
    let session = h.interpreter.session().unwrap();
    assert!(session.item("A").unwrap().filled);
    assert!(!session.item("B").unwrap().filled);
}

#[test]
fn test_nearest_scope_handler_wins() {
    let mut field = EventHandlerTable::new();
    field.add_handler("error", Handler::new(vec![Action::Exit]));
    let mut dialog = EventHandlerTable::new();
    dialog.add_handler("error.badfetch", Handler::new(vec![Action::Reprompt]));
    let document = EventHandlerTable::new();

    let resolution =
        EventHandlerTable::resolve(&[&field, &dialog, &document], "error.badfetch.timeout")
            .unwrap();
    assert_eq!(resolution.depth, 0);
    assert_eq!(resolution.pattern.to_string(), "error");
    assert_eq!(resolution.handler.actions, vec![Action::Exit]);
}

#[tokio::test]
async fn test_load_rejected_while_dialog_active() {
    let document = Document::new("a.vxml").with_dialog(Form::new("f").with_item(FormItem::field("x")));
    let mut h = harness(document, vec![]);
    start(&mut h, "a.vxml").await;
    let before = h.interpreter.document().cloned().unwrap();

    let err = h.interpreter.load_document("b.vxml").await.unwrap_err();

    assert!(matches!(
        err,
        InterpreterError::InvalidState {
            operation: "load_document",
            state: InterpreterState::DialogActive
        }
    ));
    assert_eq!(err.status_code(), StatusCode::InvalidState);
    assert_eq!(h.interpreter.state(), InterpreterState::DialogActive);
    assert!(Arc::ptr_eq(&before, h.interpreter.document().unwrap()));
}

fn two_field_form() -> Document {
    Document::new("two.vxml").with_dialog(
        Form::new("f")
            .with_item(FormItem::field("first").with_prompt(Prompt::text("First?")))
            .with_item(FormItem::field("second").with_prompt(Prompt::text("Second?"))),
    )
}

#[tokio::test]
async fn test_form_incomplete_after_first_field() {
    let document = two_field_form();
    let mut h = harness(
        document.clone(),
        vec![CollectResult::Recognized(Value::from("one"))],
    );
    start(&mut h, "two.vxml").await;

    // The script runs dry after one answer, which reads as a hangup.
    let status = h.interpreter.run().await.unwrap();
    assert_eq!(status, StatusCode::UserHangup);

    let session = h.interpreter.session().unwrap();
    let form = document.dialogs[0].as_form().unwrap();
    assert!(session.item("first").unwrap().filled);
    assert!(!session.item("second").unwrap().filled);
    assert!(!form.is_complete(session));
}

#[tokio::test]
async fn test_form_complete_after_second_field() {
    let document = two_field_form();
    let mut h = harness(
        document.clone(),
        vec![
            CollectResult::Recognized(Value::from("one")),
            CollectResult::Recognized(Value::from("two")),
        ],
    );
    start(&mut h, "two.vxml").await;
    assert!(!h.interpreter.is_complete());

    let status = h.interpreter.run().await.unwrap();

    assert_eq!(status, StatusCode::Success);
    assert!(h.interpreter.is_complete());
    let session = h.interpreter.session().unwrap();
    assert!(document.dialogs[0].as_form().unwrap().is_complete(session));
    assert_eq!(h.collector.requests().await.len(), 2);
    assert_eq!(
        session.scope().get(&vxml::ScopeLevel::DIALOG_CHAIN, "second"),
        Value::from("two")
    );
}

#[tokio::test]
async fn test_unhandled_error_event_fails_session() {
    let document = Document::new("err.vxml").with_dialog(
        Form::new("f").with_item(FormItem::block("b").with_action(Action::Throw {
            event: "com.example.failure".to_string(),
            message: None,
        })),
    );
    let mut h = harness(document, vec![]);
    start(&mut h, "err.vxml").await;

    let err = h.interpreter.run().await.unwrap_err();

    assert!(matches!(
        err,
        InterpreterError::EventNotHandled { ref event } if event == "com.example.failure"
    ));
    assert_eq!(h.interpreter.state(), InterpreterState::Error);
    assert_eq!(h.interpreter.last_status(), StatusCode::EventNotHandled);
    assert!(h.interpreter.is_complete());
}

#[tokio::test]
async fn test_exit_and_reload() {
    let document = Document::new("exit.vxml")
        .with_dialog(Form::new("f").with_item(FormItem::block("bye").with_action(Action::Exit)));
    let mut h = harness(document, vec![]);
    start(&mut h, "exit.vxml").await;

    assert_eq!(h.interpreter.run().await.unwrap(), StatusCode::ExitRequested);
    assert_eq!(h.interpreter.state(), InterpreterState::Complete);

    // Complete allows loading the next document.
    h.interpreter.load_document("exit.vxml").await.unwrap();
    assert_eq!(h.interpreter.state(), InterpreterState::Initializing);
    assert!(h.interpreter.session().is_none());
}

#[tokio::test]
async fn test_missing_document() {
    let mut h = harness(Document::new("present.vxml"), vec![]);
    let err = h.interpreter.load_document("absent.vxml").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::DocumentNotFound);
    assert_eq!(h.interpreter.state(), InterpreterState::Error);
}

#[tokio::test]
async fn test_completed_form_hands_over_to_next_dialog() {
    let document = Document::new("seq.vxml")
        .with_dialog(Form::new("first").with_item(FormItem::field("a")))
        .with_dialog(Form::new("second").with_item(FormItem::field("b")));
    let mut h = harness(
        document,
        vec![
            CollectResult::Recognized(Value::from("1")),
            CollectResult::Recognized(Value::from("2")),
        ],
    );
    start(&mut h, "seq.vxml").await;

    let status = h.interpreter.run().await.unwrap();

    assert_eq!(status, StatusCode::Success);
    assert_eq!(h.interpreter.state(), InterpreterState::Complete);
    let requests = h.collector.requests().await;
    let items: Vec<_> = requests.iter().map(|r| r.item.as_str()).collect();
    assert_eq!(items, vec!["a", "b"]);
    let session = h.interpreter.session().unwrap();
    assert_eq!(session.dialog_index(), Some(1));
    assert_eq!(session.item("b").unwrap().value, Value::from("2"));
}
