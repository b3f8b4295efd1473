//! 监督循环集成测试

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use voya::delegation::{
        Capability, DelegationRegistry, DelegationRequest, DelegationResult, WorkerUnit,
    };
    use voya::state::{InjectedContext, MemoryCheckpointStore, Role};
    use voya::supervisor::{Decision, ScriptedDecisionEngine, Supervisor};

    struct EchoWorker {
        capability: Capability,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl WorkerUnit for EchoWorker {
        fn capability(&self) -> Capability {
            self.capability
        }

        fn description(&self) -> &str {
            "echo stub"
        }

        async fn execute(
            &self,
            payload: &str,
            _context: &InjectedContext,
        ) -> DelegationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DelegationResult::ok(self.capability, format!("offers for: {payload}"))
        }
    }

    fn supervisor_with(script: ScriptedDecisionEngine, calls: Arc<AtomicUsize>) -> Supervisor {
        let mut registry = DelegationRegistry::new(5);
        registry
            .register(Arc::new(EchoWorker {
                capability: Capability::Flight,
                calls: calls.clone(),
            }))
            .unwrap();
        registry
            .register(Arc::new(EchoWorker {
                capability: Capability::Lodging,
                calls,
            }))
            .unwrap();
        Supervisor::new(
            Arc::new(script),
            Arc::new(registry),
            Arc::new(MemoryCheckpointStore::new()),
        )
    }

    #[tokio::test]
    async fn test_full_turn_search_then_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = ScriptedDecisionEngine::new(vec![
            Decision::Delegate(vec![
                DelegationRequest::new(Capability::Flight, "NYC to Rome, June 10", 0),
                DelegationRequest::new(Capability::Lodging, "Rome, June 10-14", 0),
            ]),
            Decision::Reply("Found flights and hotels for your Rome trip.".to_string()),
        ]);
        let supervisor = supervisor_with(script, calls.clone());

        let outcome = supervisor
            .handle_message(
                "trip-rome",
                "Plan a trip to Rome: flights from NYC June 10 and a hotel through the 14th",
                InjectedContext::default(),
            )
            .await
            .unwrap();

        assert!(outcome.reply.text().contains("Rome trip"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // user + 两条 worker（按发出顺序）+ assistant
        let state = supervisor.thread_history("trip-rome").await.unwrap();
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Worker);
        assert!(state.messages[1].text().starts_with("[flight]"));
        assert!(state.messages[2].text().starts_with("[lodging]"));
        assert_eq!(state.messages[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_concurrent_requests_on_same_thread_serialize() {
        let calls = Arc::new(AtomicUsize::new(0));
        // 两个回合都直接回复；若并发交错，角色序列会出现相邻的 user/user
        let script = ScriptedDecisionEngine::new(vec![
            Decision::Reply("first answer".to_string()),
            Decision::Reply("second answer".to_string()),
        ]);
        let supervisor = Arc::new(supervisor_with(script, calls));

        let a = {
            let s = supervisor.clone();
            tokio::spawn(async move {
                s.handle_message("t1", "flights to Rome", InjectedContext::default())
                    .await
            })
        };
        let b = {
            let s = supervisor.clone();
            tokio::spawn(async move {
                s.handle_message("t1", "actually, Milan instead", InjectedContext::default())
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let state = supervisor.thread_history("t1").await.unwrap();
        assert_eq!(state.messages.len(), 4);
        let roles: Vec<&Role> = state.messages.iter().map(|m| &m.role).collect();
        assert_eq!(
            roles,
            vec![&Role::User, &Role::Assistant, &Role::User, &Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = ScriptedDecisionEngine::new(vec![Decision::Reply("hello".to_string())]);
        let supervisor = supervisor_with(script, calls);

        supervisor
            .handle_message("alpha", "flights to Paris", InjectedContext::default())
            .await
            .unwrap();

        let other = supervisor.thread_history("beta").await.unwrap();
        assert!(other.messages.is_empty());
        let own = supervisor.thread_history("alpha").await.unwrap();
        assert_eq!(own.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_append_only_across_turns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = ScriptedDecisionEngine::new(
            (0..3).map(|i| Decision::Reply(format!("answer {i}"))).collect(),
        );
        let supervisor = supervisor_with(script, calls);

        let mut seen_ids: Vec<String> = Vec::new();
        for i in 0..3 {
            supervisor
                .handle_message("t1", &format!("question {i}"), InjectedContext::default())
                .await
                .unwrap();

            let state = supervisor.thread_history("t1").await.unwrap();
            assert_eq!(state.messages.len(), (i + 1) * 2);
            // 已落盘的消息原样保留，新消息只会追加在尾部
            let ids: Vec<String> = state.messages.iter().map(|m| m.id.clone()).collect();
            assert_eq!(&ids[..seen_ids.len()], &seen_ids[..]);
            seen_ids = ids;
        }
    }

    #[tokio::test]
    async fn test_injected_context_persists_across_turns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = ScriptedDecisionEngine::new(vec![
            Decision::Reply("noted".to_string()),
            Decision::Reply("still here".to_string()),
        ]);
        let supervisor = supervisor_with(script, calls);

        let ctx = InjectedContext {
            user_id: Some("u42".into()),
            user_profile: serde_json::json!({"home_airport": "JFK"}),
            itinerary_id: Some("it-7".into()),
        };
        supervisor
            .handle_message("t1", "remember my preferences", ctx)
            .await
            .unwrap();

        // 第二回合不带上下文，已合并的字段不丢
        supervisor
            .handle_message("t1", "book something", InjectedContext::default())
            .await
            .unwrap();

        let state = supervisor.thread_history("t1").await.unwrap();
        assert_eq!(state.injected_context.user_id.as_deref(), Some("u42"));
        assert_eq!(state.injected_context.itinerary_id.as_deref(), Some("it-7"));
        assert_eq!(state.injected_context.user_profile["home_airport"], "JFK");
    }
}
