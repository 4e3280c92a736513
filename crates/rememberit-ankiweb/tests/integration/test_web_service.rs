//! Legacy web service: deck list, search, editor, deck management

use rememberit_core::config::Settings;
use rememberit_core::domain::{DeckId, DeckNode, NoteId, NoteTypeId};
use rememberit_core::ports::{IWebService, NoteEdit};
use rememberit_core::{Phase, RememberItError};
use rememberit_proto::{
    AddOrUpdateRequest, CreateDeckRequest, DeckListInfoResponse, Message, RemoveDeckRequest,
    RenameDeckRequest, SearchRequest, SearchResponse, SearchResult,
};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{settings_with_cookie, web_client};

fn deck_tree() -> DeckNode {
    DeckNode {
        deck_id: 0,
        name: String::new(),
        children: vec![DeckNode {
            deck_id: 1_700_000_000_100,
            name: "Spanish".into(),
            level: 1,
            new_count: 3,
            total_in_deck: 5,
            total_including_children: 5,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn new_note(deck: i64) -> NoteEdit {
    NoteEdit {
        front: "hola".into(),
        back: "hello".into(),
        tags: "greeting".into(),
        note_type_id: None,
        deck_id: Some(DeckId::new(deck)),
        note_id: None,
    }
}

#[tokio::test]
async fn test_deck_list_decodes_tree() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    let response = DeckListInfoResponse {
        top_node: Some(deck_tree()),
        current_deck_id: Some(1_700_000_000_100),
        collection_size_bytes: Some(4096),
        media_size_bytes: None,
    };
    Mock::given(method("POST"))
        .and(path("/svc/decks/deck-list-info"))
        .and(header("content-type", "application/octet-stream"))
        .and(header("cookie", "ankiweb=abc"))
        .and(header_exists("user-agent"))
        .and(header_exists("origin"))
        .and(header_exists("referer"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(response.encode()))
        .expect(1)
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, settings_with_cookie("ankiweb=abc"));
    let info = client.deck_list(-120).await.unwrap();
    assert_eq!(info.top_node, Some(deck_tree()));
    assert_eq!(info.current_deck_id, Some(1_700_000_000_100));
    assert_eq!(info.collection_size_bytes, Some(4096));
    assert_eq!(info.media_size_bytes, None);
}

#[tokio::test]
async fn test_cookie_omitted_when_unset() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/decks/deck-list-info"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(DeckListInfoResponse::default().encode()))
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    client.deck_list(0).await.unwrap();
    let requests = web.received_requests().await.unwrap();
    assert!(requests[0].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_deck_list_forbidden_is_protocol_error() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/decks/deck-list-info"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    match client.deck_list(0).await.unwrap_err() {
        RememberItError::Protocol { phase, status, hint } => {
            assert_eq!(phase, Phase::Query);
            assert_eq!(status, 403);
            assert!(hint.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_search_sends_query_and_decodes_hits() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    let response = SearchResponse {
        results: vec![
            SearchResult {
                note_id: 1_700_000_000_500,
                text: "hola / hello".into(),
            },
            SearchResult {
                note_id: 1_700_000_000_501,
                text: "adios / goodbye".into(),
            },
        ],
    };
    Mock::given(method("POST"))
        .and(path("/svc/search/search"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(response.encode()))
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    let hits = client.search("deck:\"Spanish\"").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].note_id, NoteId::new(1_700_000_000_500));
    assert_eq!(hits[1].text, "adios / goodbye");

    let requests = web.received_requests().await.unwrap();
    let sent = SearchRequest::decode(&requests[0].body).unwrap();
    assert_eq!(sent.query, "deck:\"Spanish\"");
}

#[tokio::test]
async fn test_search_undecodable_body_is_decode_error() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/search/search"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xff, 0xff, 0xff]))
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    let err = client.search("x").await.unwrap_err();
    assert!(matches!(err, RememberItError::Decode { phase: Phase::Query, .. }));
}

#[tokio::test]
async fn test_add_note_goes_to_editor_host() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/editor/add-or-update"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&editor)
        .await;

    let settings = Settings {
        note_type_id: Some(77),
        ..Settings::default()
    };
    let client = web_client(&web, &editor, settings);
    client.add_or_update(&new_note(1_700_000_000_100)).await.unwrap();

    assert!(web.received_requests().await.unwrap().is_empty());
    let requests = editor.received_requests().await.unwrap();
    let sent = AddOrUpdateRequest::decode(&requests[0].body).unwrap();
    assert_eq!(sent.fields, vec!["hola".to_string(), "hello".to_string()]);
    assert_eq!(sent.tags, "greeting");
    let model = sent.model.unwrap();
    assert_eq!(model.note_type_id, Some(77));
    assert_eq!(model.deck_id, Some(1_700_000_000_100));
    assert_eq!(sent.existing_note_id, None);
}

#[tokio::test]
async fn test_editor_404_falls_back_to_web_host() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/editor/add-or-update"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&editor)
        .await;
    Mock::given(method("POST"))
        .and(path("/svc/editor/add-or-update"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&web)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    let edit = NoteEdit {
        note_id: Some(NoteId::new(1_700_000_000_500)),
        deck_id: None,
        ..new_note(0)
    };
    client.add_or_update(&edit).await.unwrap();

    let requests = web.received_requests().await.unwrap();
    let sent = AddOrUpdateRequest::decode(&requests[0].body).unwrap();
    assert_eq!(sent.existing_note_id, Some(1_700_000_000_500));
}

#[tokio::test]
async fn test_editor_other_errors_do_not_fall_back() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/svc/editor/add-or-update"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&editor)
        .await;

    let client = web_client(&web, &editor, Settings::default());
    let err = client.add_or_update(&new_note(5)).await.unwrap_err();
    assert!(matches!(
        err,
        RememberItError::Protocol {
            phase: Phase::Mutate,
            status: 500,
            ..
        }
    ));
    assert!(web.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_without_deck_rejected_locally() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    let client = web_client(&web, &editor, Settings::default());
    let edit = NoteEdit {
        deck_id: None,
        note_type_id: Some(NoteTypeId::new(1)),
        ..new_note(0)
    };
    let err = client.add_or_update(&edit).await.unwrap_err();
    assert!(matches!(err, RememberItError::InvalidInput(_)));
    assert!(editor.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deck_management_requests() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    for endpoint in [
        "/svc/decks/create-deck",
        "/svc/decks/rename-deck",
        "/svc/decks/remove-deck",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&web)
            .await;
    }

    let client = web_client(&web, &editor, Settings::default());
    client.create_deck("Spanish::Verbs").await.unwrap();
    client
        .rename_deck(DeckId::new(42), "Spanish::Irregular")
        .await
        .unwrap();
    client.remove_deck(DeckId::new(42)).await.unwrap();

    let requests = web.received_requests().await.unwrap();
    let create = CreateDeckRequest::decode(&requests[0].body).unwrap();
    assert_eq!(create.name, "Spanish::Verbs");
    let rename = RenameDeckRequest::decode(&requests[1].body).unwrap();
    assert_eq!(rename.deck_id, 42);
    assert_eq!(rename.name, "Spanish::Irregular");
    let remove = RemoveDeckRequest::decode(&requests[2].body).unwrap();
    assert_eq!(remove.deck_id, 42);
}

#[tokio::test]
async fn test_edit_base_url_is_editor_host() {
    let web = MockServer::start().await;
    let editor = MockServer::start().await;
    let client = web_client(&web, &editor, Settings::default());
    assert_eq!(client.edit_base_url(), editor.uri());
}
