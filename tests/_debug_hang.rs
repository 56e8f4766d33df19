use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use songclash_back::{
    catalog::{CatalogResult, CatalogRouter, TokenVerifier, VerifiedUser, VerifyError, VideoSearch},
    config::AppConfig,
    dao::store::memory::MemoryStore,
    services::room_service,
    state::AppState,
};

struct StubSearch;
impl VideoSearch for StubSearch {
    fn scrape_search(&self, _q: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        Box::pin(async move { Ok(None) })
    }
    fn api_search(&self, _q: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        Box::pin(async move { Ok(None) })
    }
}
struct StubVerifier;
impl TokenVerifier for StubVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<VerifiedUser, VerifyError>> {
        let r = token.strip_prefix("tok-").map(|uid| VerifiedUser { user_id: uid.to_string(), photo_url: None }).ok_or(VerifyError::Rejected);
        Box::pin(async move { r })
    }
}

async fn step<F: std::future::Future>(name: &str, fut: F) -> F::Output {
    eprintln!("-> starting {name}");
    let r = tokio::time::timeout(Duration::from_secs(3), fut).await;
    match r {
        Ok(v) => { eprintln!("<- finished {name}"); v }
        Err(_) => { eprintln!("!! TIMEOUT at {name}"); panic!("timeout at {name}"); }
    }
}

#[tokio::test]
async fn debug_hang() {
    let state = AppState::new(AppConfig::default(), Arc::new(CatalogRouter::new()), Arc::new(StubSearch), Arc::new(StubVerifier));
    step("install_store", state.install_store(Arc::new(MemoryStore::new()))).await;
    let data = step("create_room", room_service::create_room(&state, "conn-alice")).await.unwrap();
    let code = data["code"].as_str().unwrap().to_string();

    eprintln!("verifying token directly");
    let v = step("verify", state.verifier().verify("tok-alice")).await;
    eprintln!("verify result ok: {}", v.is_ok());

    eprintln!("registry get directly");
    let store = step("state.store()", state.store()).await;
    let slot = step("registry.get", state.registry().get(&code, store)).await.unwrap();
    eprintln!("got slot, locking room");
    {
        let mut room = step("room.lock", slot.room.lock()).await;
        eprintln!("locked room, calling join");
        let events = room.join("conn-alice", "Alice", Some("uid-alice".into()), None, 0).unwrap();
        eprintln!("joined, events: {}", events.len());
    }
    eprintln!("dropped room lock");

    step("join_room full", room_service::join_room(&state, "conn-alice", &code, "Alice", Some("tok-alice"))).await.unwrap();
    eprintln!("ALL DONE");
}
