//! Integration tests for the chat dispatcher: mode routing, the
//! two-step conversational flow, and per-session memory.

mod common;

use codelink::analysis::DocRequest;
use codelink::chat::{ChatDispatcher, ChatMode, ChatRequest};
use codelink::github::FileStatus;
use codelink::models::DocEntry;
use codelink::prompts::{BUGS_INSTRUCTION, READABILITY_INSTRUCTION};
use codelink::services::Services;
use codelink::sync::{compare_and_embed, ChangeSource};
use common::{register, test_services, FakeGitHub, RecordingAnalyzer, RecordingStore, ScriptedChatModel};
use std::sync::Arc;
use tempfile::TempDir;

fn request(mode: ChatMode, question: &str, project_id: &str, session: Option<&str>) -> ChatRequest {
    ChatRequest {
        question: question.to_string(),
        project_id: project_id.to_string(),
        mode,
        session_id: session.map(str::to_string),
        doc: DocRequest::default(),
    }
}

async fn embed_all(services: &Services, project_id: &str) {
    let report = compare_and_embed(
        services,
        "tok",
        project_id,
        &ChangeSource::Commit("https://api.github.com/repos/octo/widgets/commits/c1".to_string()),
    )
    .await
    .unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_analysis_modes_route_to_exactly_one_routine() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::default());
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await
    .with_analyzer(analyzer.clone());
    let dispatcher = ChatDispatcher::new(&services);

    let cases = [
        ("bugs", "find_bugs"),
        ("read", "check_readability"),
        ("docs", "document_function"),
        ("progress", "progress"),
        ("complete", "analyse_each_file"),
    ];

    for (mode, routine) in cases {
        analyzer.calls.lock().unwrap().clear();
        let req = request(ChatMode::from_type(Some(mode)), "why?", "p1", None);

        let answer = dispatcher.dispatch(&req).await.unwrap();

        assert_eq!(analyzer.calls(), vec![routine.to_string()], "mode {}", mode);
        assert_eq!(answer, format!("{}:p1", routine));
    }
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_conversational_turn_makes_two_model_calls() {
    let tmp = TempDir::new().unwrap();
    let github = Arc::new(FakeGitHub::new().with_file(
        "src/auth.rs",
        FileStatus::Added,
        30,
        "pub fn login(user: &str) -> Token { issue_token(user) }",
    ));
    let model = Arc::new(ScriptedChatModel::new(&[
        "How does login issue tokens?",
        "It calls issue_token.",
    ]));
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let services = test_services(&tmp, "", github, model.clone(), Arc::new(RecordingStore::new()))
        .await
        .with_analyzer(analyzer.clone());
    let project_id = register(&services, "carol", "octo/widgets", "tok").await;
    compare_and_embed(
        &services,
        "tok",
        &project_id,
        &ChangeSource::Commit("https://api.github.com/repos/octo/widgets/commits/c1".to_string()),
    )
    .await
    .unwrap();

    let req = request(ChatMode::Conversational, "and login?", &project_id, Some("s1"));
    let answer = ChatDispatcher::new(&services).dispatch(&req).await.unwrap();

    assert_eq!(answer, "It calls issue_token.");
    assert_eq!(model.call_count(), 2);
    assert!(model.prompt_text(0).contains("and login?"));
    let answer_prompt = model.prompt_text(1);
    assert!(answer_prompt.contains("issue_token(user)"));
    assert!(answer_prompt.contains("How does login issue tokens?"));
    assert!(analyzer.calls().is_empty());

    let history = services.memory.history("s1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "and login?");
    assert_eq!(history[0].answer, "It calls issue_token.");
}

#[tokio::test]
async fn test_sessions_do_not_share_history() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::new(&[
        "standalone one",
        "secret answer for alice",
        "standalone two",
        "answer for bob",
    ]));
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;
    let dispatcher = ChatDispatcher::new(&services);

    dispatcher
        .dispatch(&request(ChatMode::Conversational, "alice asks", "p1", Some("alice")))
        .await
        .unwrap();
    dispatcher
        .dispatch(&request(ChatMode::Conversational, "bob asks", "p1", Some("bob")))
        .await
        .unwrap();

    // Bob's condense and answer prompts never see Alice's turn.
    assert!(!model.prompt_text(2).contains("secret answer for alice"));
    assert!(!model.prompt_text(3).contains("alice asks"));
    assert_eq!(services.memory.history("alice").len(), 1);
    assert_eq!(services.memory.history("bob").len(), 1);
    assert_eq!(services.memory.history("bob")[0].answer, "answer for bob");
}

#[tokio::test]
async fn test_follow_up_sees_its_own_session_history() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::new(&["first", "first answer", "second", "second answer"]));
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;
    let dispatcher = ChatDispatcher::new(&services);

    for question in ["what is main?", "and then?"] {
        dispatcher
            .dispatch(&request(ChatMode::Conversational, question, "p1", None))
            .await
            .unwrap();
    }

    // Without a session id the project id is the memory key.
    assert_eq!(services.memory.history("p1").len(), 2);
    assert!(model.prompt_text(2).contains("first answer"));
}

#[tokio::test]
async fn test_docs_mode_records_entry_for_developer() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::new(&["/// Parses the widget manifest."]));
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;
    let project_id = register(&services, "carol", "octo/widgets", "tok").await;

    let mut req = request(ChatMode::Docs, "", &project_id, None);
    req.doc = DocRequest {
        function_name: "parse_manifest".to_string(),
        description: "reads widget.toml".to_string(),
        time_taken: "2h".to_string(),
        bugs: "none".to_string(),
        developer_name: "alice".to_string(),
    };

    let answer = ChatDispatcher::new(&services).dispatch(&req).await.unwrap();
    assert_eq!(answer, "/// Parses the widget manifest.");
    assert_eq!(model.call_count(), 1);

    let docs = services.projects.get_docs(&project_id).await.unwrap().unwrap();
    assert_eq!(docs.docs.len(), 1);
    assert_eq!(docs.docs[0].function_name, "parse_manifest");
    assert_eq!(docs.docs[0].username, "alice");
    assert!(!docs.docs[0].id.is_empty());
}

#[tokio::test]
async fn test_progress_without_docs_record_fails() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::default());
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;

    let req = request(ChatMode::Progress, "", "missing-project", None);
    let err = ChatDispatcher::new(&services).dispatch(&req).await.unwrap_err();

    assert!(err.to_string().contains("Project docs donot exist"));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_complete_mode_without_files() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::default());
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;

    let req = request(ChatMode::Complete, "", "p1", None);
    let answer = ChatDispatcher::new(&services).dispatch(&req).await.unwrap();

    assert_eq!(answer, "No embedded files found for this project.");
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_bugs_and_read_prompt_with_retrieved_code() {
    let tmp = TempDir::new().unwrap();
    let github = Arc::new(FakeGitHub::new().with_file(
        "src/session.rs",
        FileStatus::Added,
        12,
        "pub fn expire(session: &mut Session) { session.token.clear() }",
    ));
    let model = Arc::new(ScriptedChatModel::new(&["token never rotated", "rename expire"]));
    let services = test_services(&tmp, "", github, model.clone(), Arc::new(RecordingStore::new())).await;
    let project_id = register(&services, "carol", "octo/widgets", "tok").await;
    embed_all(&services, &project_id).await;
    let dispatcher = ChatDispatcher::new(&services);

    let bugs = dispatcher
        .dispatch(&request(ChatMode::Bugs, "session expiry", &project_id, None))
        .await
        .unwrap();
    let read = dispatcher
        .dispatch(&request(ChatMode::Read, "session expiry", &project_id, None))
        .await
        .unwrap();

    assert_eq!(bugs, "token never rotated");
    assert_eq!(read, "rename expire");
    assert_eq!(model.call_count(), 2);
    for (call, instruction) in [(0, BUGS_INSTRUCTION), (1, READABILITY_INSTRUCTION)] {
        let prompt = model.prompt_text(call);
        assert!(prompt.starts_with(instruction));
        assert!(prompt.contains("session.token.clear()"));
        assert!(prompt.ends_with("session expiry"));
    }
    // Analysis modes do not touch conversation memory.
    assert!(services.memory.history(&project_id).is_empty());
}

#[tokio::test]
async fn test_progress_prompt_carries_requirements_and_entries() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedChatModel::new(&["login is done, export is outstanding"]));
    let services = test_services(
        &tmp,
        "",
        Arc::new(FakeGitHub::new()),
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;
    let project_id = register(&services, "carol", "octo/widgets", "tok").await;
    services
        .projects
        .upsert_requirements(&project_id, "octo/widgets", "Users sign in with GitHub. Reports export to CSV.")
        .await
        .unwrap();
    services
        .projects
        .append_docs(
            &project_id,
            &[DocEntry {
                id: "d1".to_string(),
                function_name: "sign_in".to_string(),
                function_description: "starts the OAuth flow".to_string(),
                time_taken: "3h".to_string(),
                bugs: "state param unchecked".to_string(),
                username: "alice".to_string(),
            }],
        )
        .await
        .unwrap();

    let answer = ChatDispatcher::new(&services)
        .dispatch(&request(ChatMode::Progress, "", &project_id, None))
        .await
        .unwrap();

    assert_eq!(answer, "login is done, export is outstanding");
    assert_eq!(model.call_count(), 1);
    let prompt = model.prompt_text(0);
    assert!(prompt.contains("Users sign in with GitHub. Reports export to CSV."));
    assert!(prompt.contains("sign_in (alice, 3h): starts the OAuth flow | bugs: state param unchecked"));
    assert!(prompt.contains("octo/widgets"));
}

#[tokio::test]
async fn test_complete_mode_sections_follow_filename_order_up_to_limit() {
    let tmp = TempDir::new().unwrap();
    let github = Arc::new(
        FakeGitHub::new()
            .with_file("src/gamma.rs", FileStatus::Added, 10, "fn gamma_entry() {}")
            .with_file("src/alpha.rs", FileStatus::Added, 10, "fn alpha_entry() {}")
            .with_file("src/beta.rs", FileStatus::Added, 10, "fn beta_entry() {}"),
    );
    let model = Arc::new(ScriptedChatModel::new(&["alpha looks fine", "  beta needs tests \n"]));
    let services = test_services(
        &tmp,
        "[chat]\nmax_files = 2\n",
        github,
        model.clone(),
        Arc::new(RecordingStore::new()),
    )
    .await;
    let project_id = register(&services, "carol", "octo/widgets", "tok").await;
    embed_all(&services, &project_id).await;

    let answer = ChatDispatcher::new(&services)
        .dispatch(&request(ChatMode::Complete, "", &project_id, None))
        .await
        .unwrap();

    assert_eq!(
        answer,
        "## src/alpha.rs\nalpha looks fine\n\n## src/beta.rs\nbeta needs tests"
    );
    assert_eq!(model.call_count(), 2);
    assert!(model.prompt_text(0).contains("fn alpha_entry() {}"));
    assert!(model.prompt_text(0).ends_with("File: src/alpha.rs"));
    assert!(model.prompt_text(1).contains("fn beta_entry() {}"));
    assert!(!model.prompt_text(1).contains("gamma"));
}
