mod test_lifecycle {
    use llmhost::app::RecordingHandler;
    use llmhost::{EchoAdapter, GenerationOptions, LoadOptions, Orchestrator};
    use std::sync::Arc;

    fn orchestrator() -> (Orchestrator, RecordingHandler) {
        let recorder = RecordingHandler::new();
        let orchestrator = Orchestrator::builder()
            .adapter(Arc::new(EchoAdapter::new()))
            .handler(recorder.clone())
            .log_events(false)
            .build();
        (orchestrator, recorder)
    }

    #[tokio::test]
    async fn test_load_generate_stream_unload() {
        let (orchestrator, _) = orchestrator();

        let model = orchestrator.load("./m.gguf", &LoadOptions::default()).await.unwrap();
        assert_eq!(model.id(), "m-1d73c953");
        assert_eq!(model.name(), "m.gguf");
        assert!(model.is_loaded());
        let loaded_at = model.last_used_at();

        let text = orchestrator
            .generate(&model, "hello", &GenerationOptions::new().max_tokens(4))
            .await
            .unwrap();
        assert_eq!(text, "hell");
        let after_generate = model.last_used_at();
        assert!(after_generate > loaded_at);

        let mut pieces = Vec::new();
        orchestrator
            .stream_generate(&model, "hi", &GenerationOptions::new().max_tokens(5), |text, done| {
                pieces.push((text.to_string(), done));
            })
            .await
            .unwrap();
        assert_eq!(
            pieces,
            vec![
                ("h".to_string(), false),
                ("i".to_string(), false),
                (String::new(), true)
            ]
        );
        assert!(model.last_used_at() > after_generate);

        assert!(orchestrator.unload(model.id()).await);
        assert!(!model.is_loaded());
        assert!(orchestrator.list().is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_returns_same_entity() {
        let (orchestrator, recorder) = orchestrator();

        let first = orchestrator.load("/models/a.gguf", &LoadOptions::default()).await.unwrap();
        let second = orchestrator.load("/models/a.gguf", &LoadOptions::default()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(orchestrator.list().len(), 1);

        let uncached = orchestrator
            .load("/models/a.gguf", &LoadOptions::new().use_cache(false))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &uncached));
        assert_eq!(orchestrator.list().len(), 1);

        assert_eq!(recorder.count("model_loaded"), 3);
    }

    #[tokio::test]
    async fn test_explicit_id_and_unknown_unload() {
        let (orchestrator, recorder) = orchestrator();

        let model = orchestrator
            .load("/models/a.gguf", &LoadOptions::new().model_id("custom"))
            .await
            .unwrap();
        assert_eq!(model.id(), "custom");
        assert!(orchestrator.get("custom").is_some());

        assert!(!orchestrator.unload("nope").await);
        assert_eq!(recorder.count("model_unloaded"), 0);
    }
}

mod test_cancellation {
    use llmhost::{EchoAdapter, GenerationOptions, LoadOptions, Orchestrator};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_resolves_to_empty_text() {
        let orchestrator = Orchestrator::builder()
            .adapter(Arc::new(EchoAdapter::new().with_token_delay(Duration::from_millis(20))))
            .log_events(false)
            .build();
        let model = orchestrator.load("/models/slow.gguf", &LoadOptions::default()).await.unwrap();

        let gen_opts = GenerationOptions::new().max_tokens(10);
        let (text, cancelled) = tokio::join!(
            orchestrator.generate(&model, "abcdefghij", &gen_opts),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                orchestrator.cancel(&model)
            }
        );

        assert!(cancelled);
        assert_eq!(text.unwrap(), "");
    }

    #[tokio::test]
    async fn test_next_generation_clears_cancellation() {
        let orchestrator = Orchestrator::new(Arc::new(EchoAdapter::new()));
        let model = orchestrator.load("/models/a.gguf", &LoadOptions::default()).await.unwrap();

        assert!(orchestrator.cancel(model.id()));
        let text = orchestrator
            .generate(&model, "ok", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }
}

mod test_token_stream {
    use llmhost::{EchoAdapter, GenerationOptions, LoadOptions, Orchestrator, TokenStream};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_items_arrive_in_order_then_done() {
        let stream = TokenStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        stream.write(1);
        stream.on_token(move |item, done| sink.lock().push((item, done)));
        stream.write(2);
        stream.end();
        assert!(!stream.write(3));

        assert_eq!(*seen.lock(), vec![(Some(1), false), (Some(2), false), (None, true)]);
    }

    #[tokio::test]
    async fn test_stream_to_feeds_subscribers() {
        let orchestrator = Orchestrator::new(Arc::new(EchoAdapter::new()));
        let model = orchestrator.load("/models/a.gguf", &LoadOptions::default()).await.unwrap();

        let stream = orchestrator.token_stream();
        let text = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&text);
        stream.on_token(move |item, _| {
            if let Some(piece) = item {
                sink.lock().push_str(&piece);
            }
        });

        orchestrator
            .stream_to(&model, "stream", &GenerationOptions::new().max_tokens(3), &stream)
            .await
            .unwrap();

        assert!(stream.is_ended());
        assert_eq!(*text.lock(), "str");
    }
}

mod test_discovery {
    use llmhost::{EchoAdapter, Orchestrator, OrchestratorConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_discovers_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.gguf"), b"GGUF").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"#").unwrap();

        let config = OrchestratorConfig {
            models_dir: dir.path().to_path_buf(),
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::builder()
            .config(config)
            .adapter(Arc::new(EchoAdapter::new()))
            .build();

        let found = orchestrator.discover_models(None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "tiny.gguf");
        assert_eq!(found[0].size_bytes, 4);
    }
}
