//! End-to-end phase behavior against the in-memory store

use chrono::Duration;
use pretty_assertions::assert_eq;
use quill_core::{
    collect_salient_terms, CancellationToken, CritiqueLoop, PhaseError, PlanningOutcome,
    SceneChain,
};
use quill_store::Store;
use quill_test_utils::{json_reply, seed_story, vision_reply, ScriptedChatClient, StoryFixture};
use quill_types::{
    BacklogStatus, ChangeType, Clock, CritiqueBudgetStatus, ExecutionOutcome, ObligationStatus,
    PhaseKind, SceneStatus, WorldBibleEntry,
};
use serde_json::json;
use std::sync::Arc;

fn world_bible_reply(mira_summary: &str) -> String {
    json_reply(&json!({
        "characters": [
            { "name": "Mira", "summary": mira_summary, "status": "active" }
        ],
        "locations": [
            {
                "name": "Hollow Market",
                "summary": "A bazaar rebuilt inside a burned-out granary.",
                "status": "active",
                "continuityNotes": ["Stalls close at ashfall"]
            }
        ]
    }))
}

async fn mira_entries(story: &StoryFixture) -> Vec<WorldBibleEntry> {
    let bible = story
        .store
        .find_world_bible(story.plan.id, "story", "main")
        .await
        .unwrap()
        .expect("bible created");
    story
        .store
        .world_bible_entries(bible.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.slug == "characters:mira")
        .collect()
}

#[tokio::test]
async fn world_bible_runs_version_an_updated_character() {
    let story = seed_story().await;
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply(world_bible_reply("A cartographer searching for her brother."))
            .reply(world_bible_reply("A cartographer who found her brother in the ash.")),
    );
    let runner = story.runner(chat.clone());
    let cancel = CancellationToken::new();

    let first = runner
        .execute(PhaseKind::WorldBible, &story.context(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.status, PlanningOutcome::Success);

    let after_first = mira_entries(&story).await;
    assert_eq!(after_first.len(), 1);
    assert!(after_first[0].is_active);
    assert_eq!(after_first[0].version, 1);
    assert_eq!(after_first[0].change_type, ChangeType::Seed);
    assert_eq!(after_first[0].provenance.execution_id, first.execution_id);

    story.clock.advance(Duration::minutes(5));
    runner
        .execute(PhaseKind::WorldBible, &story.context(), &cancel)
        .await
        .unwrap();

    let after_second = mira_entries(&story).await;
    assert_eq!(after_second.len(), 2);
    let v1 = after_second.iter().find(|e| e.version == 1).unwrap();
    let v2 = after_second.iter().find(|e| e.version == 2).unwrap();
    assert!(!v1.is_active);
    assert!(v2.is_active);
    assert_eq!(v2.change_type, ChangeType::Update);
    assert_eq!(v2.derived_from_entry_id, Some(v1.id));
    assert!(v2.sequence > v1.sequence);
    assert!(v2.summary.contains("found her brother"));

    let second_prompt = &chat.requests()[1].prompt;
    assert!(second_prompt.contains("Mira (characters, active)"));
}

#[tokio::test]
async fn world_bible_retires_entries_missing_from_the_pass() {
    let story = seed_story().await;
    let only_mira = json_reply(&json!({
        "characters": [
            {
                "name": "Mira",
                "summary": "A cartographer searching for her brother.",
                "status": "active"
            }
        ],
        "locations": []
    }));
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply(world_bible_reply("A cartographer searching for her brother."))
            .reply(only_mira),
    );
    let runner = story.runner(chat);
    let cancel = CancellationToken::new();
    runner.execute(PhaseKind::WorldBible, &story.context(), &cancel).await.unwrap();
    let result = runner
        .execute(PhaseKind::WorldBible, &story.context(), &cancel)
        .await
        .unwrap();

    assert_eq!(result.data.get("retired").and_then(|v| v.as_f64()), Some(1.0));
    let bible = story
        .store
        .find_world_bible(story.plan.id, "story", "main")
        .await
        .unwrap()
        .unwrap();
    let market: Vec<_> = story
        .store
        .world_bible_entries(bible.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.slug == "locations:hollow-market")
        .collect();
    assert_eq!(market.len(), 1, "sweep deactivates in place");
    assert!(!market[0].is_active);
}

async fn scene_terms(story: &StoryFixture) -> Vec<String> {
    let chain = SceneChain::load(story.store.as_ref(), story.scene.id, story.agent_id)
        .await
        .unwrap();
    collect_salient_terms(&story.plan, &chain).into_vec()
}

#[tokio::test]
async fn scene_reply_missing_scroll_title_is_rejected() {
    let story = seed_story().await;
    let terms = scene_terms(&story).await;
    assert!(terms.contains(&"Ashfall Prologue".to_string()));
    let reply = terms
        .iter()
        .filter(|t| t.as_str() != "Ashfall Prologue")
        .cloned()
        .collect::<Vec<_>>()
        .join(". ");
    let chat = Arc::new(ScriptedChatClient::new().reply(reply));
    let runner = story.runner(chat.clone());

    let error = runner
        .execute(PhaseKind::SceneWeaver, &story.context(), &CancellationToken::new())
        .await
        .unwrap_err();

    let validation = error.validation().expect("gate failure");
    assert_eq!(validation.missing_terms(), ["Ashfall Prologue".to_string()]);
    let transcript = error.transcript().unwrap();
    assert_eq!(transcript.correlation.scene_id, Some(story.scene.id));
    assert_eq!(transcript.correlation.scroll_id, Some(story.scroll.id));

    let scene = story.store.scene(story.scene.id).await.unwrap().unwrap();
    assert_eq!(scene.status, SceneStatus::Pending);
    assert!(scene.content.is_none());

    let prompt = &chat.requests()[0].prompt;
    assert!(prompt.contains("## Scroll Synopsis\n[no scroll synopsis available]"));
    assert!(prompt.contains("## Blueprint Structure\n[no blueprint structure available]"));
    assert!(prompt.contains("- The market burned once before"));
}

#[tokio::test]
async fn scene_reply_covering_every_term_completes_the_scene() {
    let story = seed_story().await;
    let reply = scene_terms(&story).await.join(". ");
    let chat = Arc::new(ScriptedChatClient::new().reply(reply.clone()));
    let runner = story.runner(chat);

    let result = runner
        .execute(PhaseKind::SceneWeaver, &story.context(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, PlanningOutcome::Success);
    let scene = story.store.scene(story.scene.id).await.unwrap().unwrap();
    assert_eq!(scene.status, SceneStatus::Completed);
    assert_eq!(scene.content.as_deref(), Some(reply.as_str()));
}

#[tokio::test]
async fn archived_scene_is_left_untouched() {
    let mut story = seed_story().await;
    story.set_scene_status(SceneStatus::Archived).await;
    let reply = scene_terms(&story).await.join(". ");
    let chat = Arc::new(ScriptedChatClient::new().reply(reply));
    let runner = story.runner(chat);

    let result = runner
        .execute(PhaseKind::SceneWeaver, &story.context(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, PlanningOutcome::Partial);
    assert_eq!(result.blocked.len(), 1);
    let scene = story.store.scene(story.scene.id).await.unwrap().unwrap();
    assert_eq!(scene.status, SceneStatus::Archived);
    assert!(scene.content.is_none());
    let executions = story.store.executions(None).await.unwrap();
    assert_eq!(executions[0].outcome, ExecutionOutcome::Blocked);
}

#[tokio::test]
async fn scene_phase_requires_a_scene_id() {
    let story = seed_story().await;
    let chat = Arc::new(ScriptedChatClient::new());
    let runner = story.runner(chat.clone());
    let mut ctx = story.context();
    ctx.scene_id = None;

    let error = runner
        .execute(PhaseKind::SceneWeaver, &ctx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, PhaseError::MissingInput { input: "scene_id", .. }));
    assert_eq!(chat.call_count(), 0);
}

fn planning_reply(ids: &[&str]) -> String {
    let backlog: Vec<_> = ids
        .iter()
        .map(|id| json!({ "id": id, "title": format!("Draft {id}"), "priority": "medium" }))
        .collect();
    json_reply(&json!({
        "passTitle": "Opening moves",
        "summary": "Set up the caravan, the market fire and Mira's search for her brother.",
        "backlog": backlog,
        "obligations": [
            { "persona": "Mira", "description": "Must reveal the map she stole" }
        ]
    }))
}

#[tokio::test]
async fn planning_pass_creates_backlog_and_reports_duplicates() {
    let story = seed_story().await;
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply(planning_reply(&["B-1", "B-2"]))
            .reply(planning_reply(&["B-2", "B-3"])),
    );
    let runner = story.runner(chat);
    let cancel = CancellationToken::new();

    let first = runner
        .execute(PhaseKind::Iterative, &story.context(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.status, PlanningOutcome::Success);

    let second = runner
        .execute(PhaseKind::Iterative, &story.context().with_iteration(1), &cancel)
        .await
        .unwrap();
    assert_eq!(second.status, PlanningOutcome::Partial);
    assert_eq!(second.blocked, vec!["backlog item 'B-2' already exists".to_string()]);

    let plan = story.store.plan(story.plan.id).await.unwrap().unwrap();
    assert_eq!(plan.passes.len(), 2);

    let items = story.store.backlog_items(Some(story.plan.id)).await.unwrap();
    let mut ids: Vec<_> = items.iter().map(|i| i.backlog_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["B-1", "B-2", "B-3"]);
    assert!(items.iter().all(|i| i.status == BacklogStatus::Pending));
    let b3 = items.iter().find(|i| i.backlog_id == "B-3").unwrap();
    assert_eq!(b3.pass_index, Some(1));

    let obligations = story.store.obligations(Some(story.plan.id)).await.unwrap();
    assert_eq!(obligations.len(), 2);
    assert!(obligations
        .iter()
        .all(|o| o.status == ObligationStatus::Open && o.agent_id == Some(story.agent_id)));
}

fn progress_reply(new_id: &str, progress: &[(&str, &str)]) -> String {
    let progress: Vec<_> = progress
        .iter()
        .map(|(id, status)| json!({ "id": id, "status": status }))
        .collect();
    json_reply(&json!({
        "passTitle": "Caravan leaves",
        "summary": "The caravan departs at dawn while Mira bargains for passage east.",
        "backlog": [{ "id": new_id, "title": format!("Draft {new_id}"), "priority": "low" }],
        "progress": progress
    }))
}

#[tokio::test]
async fn planning_pass_moves_existing_items_forward() {
    let story = seed_story().await;
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply(planning_reply(&["B-1", "B-2"]))
            .reply(progress_reply("B-3", &[("B-1", "in-progress"), ("B-9", "complete")]))
            .reply(progress_reply("B-4", &[("B-1", "complete")])),
    );
    let runner = story.runner(chat);
    let cancel = CancellationToken::new();

    runner
        .execute(PhaseKind::Iterative, &story.context(), &cancel)
        .await
        .unwrap();

    story.clock.advance(Duration::minutes(10));
    let second = runner
        .execute(PhaseKind::Iterative, &story.context().with_iteration(1), &cancel)
        .await
        .unwrap();
    assert_eq!(second.status, PlanningOutcome::Partial);
    assert_eq!(second.blocked, vec!["backlog item 'B-9' not found".to_string()]);

    let items = story.store.backlog_items(Some(story.plan.id)).await.unwrap();
    let b1 = items.iter().find(|i| i.backlog_id == "B-1").unwrap();
    assert_eq!(b1.status, BacklogStatus::InProgress);
    assert_eq!(b1.in_progress_at, Some(story.clock.now()));

    story.clock.advance(Duration::minutes(10));
    let third = runner
        .execute(PhaseKind::Iterative, &story.context().with_iteration(2), &cancel)
        .await
        .unwrap();
    assert_eq!(third.status, PlanningOutcome::Success);
    let items = story.store.backlog_items(Some(story.plan.id)).await.unwrap();
    let b1 = items.iter().find(|i| i.backlog_id == "B-1").unwrap();
    assert_eq!(b1.status, BacklogStatus::Complete);
    assert_eq!(b1.completed_at, Some(story.clock.now()));
}

#[tokio::test]
async fn planning_pass_rejects_a_skipped_backlog_step() {
    let story = seed_story().await;
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply(planning_reply(&["B-1"]))
            .reply(progress_reply("B-2", &[("B-1", "complete")])),
    );
    let runner = story.runner(chat);
    let cancel = CancellationToken::new();

    runner
        .execute(PhaseKind::Iterative, &story.context(), &cancel)
        .await
        .unwrap();
    let error = runner
        .execute(PhaseKind::Iterative, &story.context().with_iteration(1), &cancel)
        .await
        .unwrap_err();

    match &error {
        PhaseError::Persistence { source, .. } => {
            assert!(matches!(**source, PhaseError::Transition(_)));
            assert_eq!(
                source.to_string(),
                "backlog item 'B-1' cannot move from Pending to Complete"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(error.transcript().is_some());
    assert!(!error.is_retryable());

    let plan = story.store.plan(story.plan.id).await.unwrap().unwrap();
    assert_eq!(plan.passes.len(), 1);
    let items = story.store.backlog_items(Some(story.plan.id)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, BacklogStatus::Pending);
}

fn blueprint_reply() -> String {
    json_reply(&json!({
        "title": "The Glass Archive",
        "description": "Mira breaks into the archive beneath the market.",
        "synopsis": "Mira follows her brother's trail into a library of glass maps beneath the city.",
        "sections": [
            {
                "title": "Descent",
                "summary": "The stairwell under the granary.",
                "scenes": [
                    {
                        "title": "Stairwell",
                        "description": "Mira lights the last lantern and descends."
                    }
                ]
            },
            {
                "title": "The Stacks",
                "summary": "Shelves of maps that move on their own.",
                "scenes": [
                    {
                        "title": "Moving Maps",
                        "description": "The shelves rearrange themselves around her."
                    },
                    {
                        "title": "The Brother's Map",
                        "description": "She finds a map in her brother's hand."
                    }
                ]
            }
        ]
    }))
}

fn scroll_reply() -> String {
    json_reply(&json!({
        "title": "The Glass Archive, revised",
        "synopsis": "Mira enters the archive with a guide and loses him in the moving stacks.",
        "sections": [
            { "title": "The Guide", "summary": "A mapmaker offers to lead her down.", "order": 0 }
        ]
    }))
}

#[tokio::test]
async fn architect_then_refiner_versions_the_scroll() {
    let story = seed_story().await;
    let chat = Arc::new(ScriptedChatClient::new().reply(blueprint_reply()).reply(scroll_reply()));
    let runner = story.runner(chat);
    let cancel = CancellationToken::new();

    let created = runner
        .execute(PhaseKind::ChapterArchitect, &story.context(), &cancel)
        .await
        .unwrap();
    let blueprint_id = created
        .data
        .get("blueprintId")
        .and_then(|v| v.as_str())
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(created.data.get("scenes").and_then(|v| v.as_f64()), Some(3.0));

    let scrolls = story.store.scrolls_for_blueprint(blueprint_id).await.unwrap();
    assert_eq!(scrolls.len(), 1);
    assert!(scrolls[0].is_active && scrolls[0].version == 1);
    let sections = story.store.sections_for_scroll(scrolls[0].id).await.unwrap();
    assert_eq!(sections.len(), 2);
    let scenes = story.store.scenes_for_section(sections[1].id).await.unwrap();
    assert_eq!(scenes.len(), 2);
    assert!(scenes.iter().all(|s| s.status == SceneStatus::Pending));

    let ctx = story.context().with_blueprint(blueprint_id);
    let refined = runner
        .execute(PhaseKind::ScrollRefiner, &ctx, &cancel)
        .await
        .unwrap();
    assert_eq!(refined.status, PlanningOutcome::Success);

    let scrolls = story.store.scrolls_for_blueprint(blueprint_id).await.unwrap();
    assert_eq!(scrolls.len(), 2);
    assert_eq!(scrolls.iter().filter(|s| s.is_active).count(), 1);
    let active = story.store.active_scroll(blueprint_id).await.unwrap().unwrap();
    assert_eq!(active.version, 2);
    assert_eq!(active.slug, "the-glass-archive-revised");
}

#[tokio::test]
async fn refiner_without_blueprint_is_not_found() {
    let story = seed_story().await;
    let chat = Arc::new(ScriptedChatClient::new());
    let runner = story.runner(chat);
    let ctx = story.context().with_blueprint(quill_types::BlueprintId::new());

    let error = runner
        .execute(PhaseKind::ScrollRefiner, &ctx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(error, PhaseError::NotFound { entity: "blueprint", .. }));
}

#[tokio::test]
async fn critique_loop_retries_with_feedback_until_valid() {
    let story = seed_story().await;
    let chat = Arc::new(
        ScriptedChatClient::new()
            .reply("no json here")
            .reply(vision_reply()),
    );
    let runner = story.runner(chat.clone());

    let result = CritiqueLoop::new(3)
        .execute(&runner, PhaseKind::Vision, &story.context(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, PlanningOutcome::Success);
    let requests = chat.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].prompt.contains("Previous Attempt Rejected"));
    assert!(requests[1].prompt.contains("## Previous Attempt Rejected (1/3)"));

    let executions = story.store.executions(None).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert!(executions
        .iter()
        .all(|e| e.critique_status == CritiqueBudgetStatus::WithinBudget));
}

#[tokio::test]
async fn critique_loop_marks_the_last_rejection_exhausted() {
    let story = seed_story().await;
    let chat = Arc::new(ScriptedChatClient::new().reply("nope").reply("still nope"));
    let runner = story.runner(chat.clone());

    let error = CritiqueLoop::new(2)
        .execute(&runner, PhaseKind::Vision, &story.context(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, PhaseError::ValidationFailed { .. }));
    assert_eq!(chat.call_count(), 2);
    let executions = story.store.executions(None).await.unwrap();
    let exhausted = executions
        .iter()
        .filter(|e| e.critique_status == CritiqueBudgetStatus::Exhausted)
        .count();
    assert_eq!(exhausted, 1);
}

#[tokio::test]
async fn critique_loop_does_not_retry_other_failures() {
    let story = seed_story().await;
    let chat = Arc::new(ScriptedChatClient::new());
    let runner = story.runner(chat.clone());

    let result = CritiqueLoop::default()
        .run(&runner, PhaseKind::Vision, &story.context(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, PlanningOutcome::Failed);
    assert!(matches!(result.error, Some(PhaseError::Chat(_))));
    assert_eq!(chat.call_count(), 1);
}
