// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Config file -> validated pipeline, through the umbrella crate.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use mmprep::config::{load_config, validate_config};
use mmprep::prelude::*;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[cfg(test)]
mod test_config_to_pipeline {
    use super::*;

    #[test]
    fn test_pipeline_from_config_file() {
        let file = write_config(
            r#"
[pipeline]
batch_size = 2
num_threads = 1
queue_depth = 3
enable_fusion = false
acquire_timeout_ms = 40
"#,
        );
        let config = load_config(Some(file.path()), None).unwrap();
        validate_config(&config).unwrap();

        let context = Arc::new(PipelineContext::with_builtin_ops().unwrap());
        let mut pipeline = Pipeline::from_config(context, &config.pipeline).unwrap();
        assert_eq!(pipeline.batch_size(), 2);
        assert_eq!(pipeline.queue_depth(), 3);
        assert!(!pipeline.fusion_enabled());

        pipeline
            .build(
                vec![
                    OpSpec::new("ExternalSource").with_output("raw", "cpu"),
                    OpSpec::new("ToTensor")
                        .with_input("raw", "cpu")
                        .with_output("t", "cpu")
                        .with_arg("layout", 1i64),
                ],
                &["t"],
            )
            .unwrap();

        let frames = ndarray::ArrayD::<u8>::from_elem(ndarray::IxDyn(&[2, 10, 10, 3]), 255);
        let inputs = HashMap::from([(
            "raw".to_string(),
            TensorList::from_tensors(vec![Tensor::new(frames, TensorLayout::Nhwc)]),
        )]);
        let outputs = pipeline.run_and_fetch(inputs, true).unwrap();
        let list = outputs[0].read();
        let tensor = list.get(0).unwrap();
        assert_eq!(tensor.layout(), TensorLayout::Nhwc);
        assert!(tensor.as_f32().unwrap().iter().all(|v| (*v - 1.0).abs() < 1e-6));

        // the configured window, not the context default, bounds the wait
        let start = std::time::Instant::now();
        assert!(matches!(pipeline.outputs(), Err(PipelineError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_out_of_range_config_is_rejected() {
        let file = write_config("[pipeline]\nqueue_depth = 1\n");
        let config = load_config(Some(file.path()), None).unwrap();
        assert!(validate_config(&config).is_err());

        let context = Arc::new(PipelineContext::with_builtin_ops().unwrap());
        let err = Pipeline::from_config(context, &config.pipeline).err().unwrap();
        assert_eq!(err.code(), 4);
    }
}
