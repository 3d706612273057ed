//! End-to-end exercise of the full extension wiring: host, generator,
//! confirmer, settings store, and the command registry together.

use std::sync::{Arc, Mutex};

use understudy::commands::{NamedArgs, default_commands};
use understudy::flow::Understudy;
use understudy::host::{AutoConfirmer, FnGenerator, StaticHost};
use understudy::settings::JsonSettingsStore;
use understudy::{CharacterCard, ChatMessage};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn aria() -> CharacterCard {
    CharacterCard::named("Aria")
        .with_description("a wandering bard")
        .with_personality("cheerful, quick-witted")
        .with_scenario("a tavern at dusk")
}

fn capturing_generator(response: &str) -> (FnGenerator, Arc<Mutex<String>>) {
    let captured = Arc::new(Mutex::new(String::new()));
    let sink = captured.clone();
    let response = response.to_string();
    let generator = FnGenerator::new(move |prompt| {
        let sink = sink.clone();
        let response = response.clone();
        async move {
            if let Ok(mut seen) = sink.lock() {
                *seen = prompt;
            }
            Ok(response)
        }
    });
    (generator, captured)
}

#[tokio::test]
async fn roleplay_round_trip_inserts_the_confirmed_reply() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonSettingsStore::new(dir.path().join("settings.json")));

    let host = Arc::new(
        StaticHost::new()
            .with_character(aria())
            .with_user_name("Sam")
            .with_chat(vec![
                ChatMessage::system("chat created"),
                ChatMessage::user("hi").named("Sam"),
            ]),
    );
    let (generator, captured) = capturing_generator("Ah, Sam! Pull up a chair.");

    let understudy = Arc::new(
        Understudy::new(host.clone())
            .with_generator(Arc::new(generator))
            .with_confirmer(Arc::new(AutoConfirmer::yes()))
            .with_settings_store(store),
    );
    let commands = default_commands(understudy);

    let out = commands
        .dispatch("roleplay", &NamedArgs::new(), "What's up?")
        .await;
    assert_eq!(out, "Roleplay complete. Response generated as Aria.");

    // The composed prompt carried the card, the projected history (system
    // turn excluded), the latest message, and the closing instruction.
    let prompt = captured.lock().unwrap().clone();
    assert!(prompt.starts_with("You are now roleplaying as Aria."));
    assert!(prompt.contains("Character Information:\nName: Aria\nDescription: a wandering bard"));
    assert!(prompt.contains("Recent conversation history:\nSam: hi"));
    assert!(!prompt.contains("chat created"));
    assert!(prompt.ends_with("\n\nLatest message to respond to: What's up?\n\nRespond as Aria:"));

    // The confirmed reply landed in the chat and the view was refreshed.
    let log = host.messages();
    let inserted = log.last().unwrap();
    assert_eq!(inserted.name.as_deref(), Some("Aria"));
    assert_eq!(inserted.text, "Ah, Sam! Pull up a chair.");
    assert!(!inserted.is_user);
    assert_eq!(host.refresh_count(), 1);
}

#[tokio::test]
async fn declined_insertion_still_reports_success() {
    init_tracing();
    let host = Arc::new(StaticHost::new().with_character(aria()));
    let (generator, _) = capturing_generator("Another round, then!");

    let understudy = Arc::new(
        Understudy::new(host.clone())
            .with_generator(Arc::new(generator))
            .with_confirmer(Arc::new(AutoConfirmer::no())),
    );
    let commands = default_commands(understudy);

    let out = commands.dispatch("roleplay", &NamedArgs::new(), "").await;
    assert_eq!(out, "Roleplay complete. Response generated as Aria.");
    assert!(host.messages().is_empty());
    assert_eq!(host.refresh_count(), 0);
}

#[tokio::test]
async fn missing_confirmer_surfaces_the_response_inline() {
    init_tracing();
    let host = Arc::new(StaticHost::new().with_character(aria()));
    let (generator, _) = capturing_generator("A song it is.");

    let understudy =
        Arc::new(Understudy::new(host.clone()).with_generator(Arc::new(generator)));
    let commands = default_commands(understudy);

    let out = commands.dispatch("roleplay", &NamedArgs::new(), "sing!").await;
    assert_eq!(out, "Aria (Impersonated) says:\n\nA song it is.");
    assert!(host.messages().is_empty());
}

#[tokio::test]
async fn custom_prompt_survives_a_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    // First session: set a custom prompt through the command.
    {
        let understudy = Arc::new(
            Understudy::new(Arc::new(StaticHost::new().with_character(aria())))
                .with_settings_store(Arc::new(JsonSettingsStore::new(&path))),
        );
        let commands = default_commands(understudy);
        let out = commands
            .dispatch("setimprompt", &NamedArgs::new(), "Answer only in verse.")
            .await;
        assert_eq!(out, "Custom system prompt updated: Answer only in verse.");
    }

    // Second session over the same store: the prompt is back, and the
    // composer uses it.
    let (generator, captured) = capturing_generator("So I shall.");
    let understudy = Arc::new(
        Understudy::new(Arc::new(StaticHost::new().with_character(aria())))
            .with_generator(Arc::new(generator))
            .with_confirmer(Arc::new(AutoConfirmer::no()))
            .with_settings_store(Arc::new(JsonSettingsStore::new(&path))),
    );
    let commands = default_commands(understudy.clone());

    let view = commands.dispatch("setprompt", &NamedArgs::new(), "").await;
    assert_eq!(view, "Current custom system prompt: Answer only in verse.");

    commands.dispatch("roleplay", &NamedArgs::new(), "").await;
    assert!(captured.lock().unwrap().starts_with("Answer only in verse."));
}
