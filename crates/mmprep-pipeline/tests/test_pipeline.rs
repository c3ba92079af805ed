// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end behaviour of built pipelines: feeding, pipelined runs, fusion and
//! build failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mmprep_pipeline::{Pipeline, PipelineContext};
use mmprep_structures::{OpSpec, PipelineError, SharedTensorList, Tensor, TensorLayout, TensorList};

fn context() -> Arc<PipelineContext> {
    Arc::new(
        PipelineContext::with_builtin_ops()
            .unwrap()
            .with_acquire_timeout(Duration::from_millis(50)),
    )
}

fn threads() -> usize {
    mmprep_runtime::online_cpus().min(2)
}

/// NHWC u8 batch with a deterministic gradient
fn frames(batch: usize, height: usize, width: usize) -> TensorList {
    let data = ndarray::ArrayD::from_shape_fn(ndarray::IxDyn(&[batch, height, width, 3]), |idx| {
        ((idx[0] * 31 + idx[1] * 7 + idx[2] * 3 + idx[3] * 11) % 256) as u8
    });
    TensorList::from_tensors(vec![Tensor::new(data, TensorLayout::Nhwc)])
}

fn feed(list: TensorList) -> HashMap<String, TensorList> {
    HashMap::from([("raw".to_string(), list)])
}

fn to_tensor_specs() -> Vec<OpSpec> {
    vec![
        OpSpec::new("ExternalSource").with_output("raw", "cpu"),
        OpSpec::new("ToTensor")
            .with_input("raw", "cpu")
            .with_output("t", "cpu")
            .with_arg("layout", 0i64),
    ]
}

fn preprocess_specs() -> Vec<OpSpec> {
    let mut specs = to_tensor_specs();
    specs.push(
        OpSpec::new("ResizeCrop")
            .with_input("t", "cpu")
            .with_output("rc", "cpu")
            .with_arg("resize", vec![24i64, 24])
            .with_arg("crop", vec![16i64, 16])
            .with_arg("crop_pos_x", 0.25f32),
    );
    specs.push(
        OpSpec::new("Normalize")
            .with_input("rc", "cpu")
            .with_output("n", "cpu")
            .with_arg("mean", vec![0.485f32, 0.456, 0.406])
            .with_arg("stddev", vec![0.229f32, 0.224, 0.225]),
    );
    specs
}

fn f32_values(buffer: &SharedTensorList) -> Vec<f32> {
    let list = buffer.read();
    list.iter()
        .flat_map(|t| t.as_f32().unwrap().iter().copied().collect::<Vec<_>>())
        .collect()
}

#[cfg(test)]
mod test_end_to_end {
    use super::*;

    #[test]
    fn test_to_tensor_pipeline() {
        let mut pipeline = Pipeline::new(context(), 4, threads(), 2, true).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();

        pipeline.run(feed(frames(1, 4, 4)), false).unwrap();
        let outputs = pipeline.outputs().unwrap();
        assert_eq!(outputs.len(), 1);
        {
            let list = outputs[0].read();
            assert_eq!(list.len(), 1);
            let tensor = list.get(0).unwrap();
            assert_eq!(tensor.layout(), TensorLayout::Nchw);
            assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
            // pixel (0, 1, 2), channel 1 of the NHWC feed
            let expected = f32::from(((7 + 6 + 11) % 256) as u8) / 255.0;
            let got = tensor.as_f32().unwrap()[[0, 1, 1, 2]];
            assert!((got - expected).abs() < 1e-6);
        }

        // nothing fed for the second run
        let err = pipeline.run(HashMap::new(), false).unwrap_err();
        assert!(matches!(err, PipelineError::Operator { .. }));
        assert!(err.to_string().contains("ExternalSource is empty"));
    }

    #[test]
    fn test_run_and_fetch_with_copy() {
        let mut pipeline = Pipeline::new(context(), 2, 1, 2, false).unwrap();
        pipeline.build(to_tensor_specs(), &["raw", "t"]).unwrap();

        let batch = frames(2, 12, 12);
        let outputs = pipeline.run_and_fetch(feed(batch.clone()), true).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(*outputs[0].read(), batch);
        assert_eq!(outputs[1].read().get(0).unwrap().shape(), &[2, 3, 12, 12]);
    }

    #[test]
    fn test_unused_inputs_are_ignored() {
        let mut pipeline = Pipeline::new(context(), 1, 1, 2, false).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();

        let mut inputs = feed(frames(1, 10, 10));
        inputs.insert("labels".to_string(), TensorList::new());
        pipeline.run(inputs, false).unwrap();
    }

    #[test]
    fn test_topological_order() {
        let mut pipeline = Pipeline::new(context(), 2, 1, 2, false).unwrap();
        let mut specs = preprocess_specs();
        specs.reverse();
        pipeline.build(specs, &["n"]).unwrap();

        let graph = pipeline.executor().graph().unwrap();
        assert_eq!(graph.op_nodes().len(), 4);
        for (id, node) in graph.op_nodes().iter().enumerate() {
            for data_id in node.inputs() {
                assert!(graph.data_nodes()[*data_id].producer < id);
            }
        }
    }
}

#[cfg(test)]
mod test_feeding {
    use super::*;

    #[test]
    fn test_feeding_non_source_output_fails_the_run() {
        let mut pipeline = Pipeline::new(context(), 1, 1, 2, false).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();
        let inputs = HashMap::from([("t".to_string(), frames(1, 8, 8))]);
        let err = pipeline.run(inputs, false).unwrap_err();
        assert!(matches!(err, PipelineError::Operator { .. }));
    }

    #[test]
    fn test_zero_width_frames_fail_with_tensor_error() {
        for enable_fusion in [false, true] {
            let mut pipeline = Pipeline::new(context(), 1, threads(), 2, enable_fusion).unwrap();
            pipeline.build(preprocess_specs(), &["n"]).unwrap();
            let err = pipeline.run(feed(frames(1, 8, 0)), false).unwrap_err();
            assert!(matches!(err, PipelineError::Tensor(_)), "fusion {}: {}", enable_fusion, err);
        }
    }
}

#[cfg(test)]
mod test_fusion {
    use super::*;

    fn run_preprocess(enable_fusion: bool, outputs: &[&str]) -> (Pipeline, Vec<SharedTensorList>) {
        let mut pipeline = Pipeline::new(context(), 4, threads(), 2, enable_fusion).unwrap();
        pipeline.build(preprocess_specs(), outputs).unwrap();
        let fetched = pipeline.run_and_fetch(feed(frames(3, 32, 40)), false).unwrap();
        (pipeline, fetched)
    }

    #[test]
    fn test_fused_matches_unfused() {
        let (fused, fused_out) = run_preprocess(true, &["n"]);
        let (plain, plain_out) = run_preprocess(false, &["n"]);

        assert!(fused.graph_summary().unwrap().contains("ToTensorResizeCropNormalize"));
        assert!(!plain.graph_summary().unwrap().contains("ToTensorResizeCropNormalize"));
        assert_eq!(fused.executor().graph().unwrap().op_nodes().len(), 2);

        let fused_tensor_shape = fused_out[0].read().get(0).unwrap().shape().to_vec();
        assert_eq!(fused_tensor_shape, vec![3, 3, 16, 16]);
        assert_eq!(fused_out[0].read().layout(), Some(TensorLayout::Nchw));

        let a = f32_values(&fused_out[0]);
        let b = f32_values(&plain_out[0]);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_declared_interior_output_prevents_fusion() {
        for outputs in [&["rc", "n"][..], &["t", "n"][..]] {
            let (pipeline, fetched) = run_preprocess(true, outputs);
            assert_eq!(pipeline.executor().graph().unwrap().op_nodes().len(), 4);
            assert!(!pipeline.graph_summary().unwrap().contains("ToTensorResizeCropNormalize"));
            assert_eq!(fetched.len(), 2);
        }
    }

    #[test]
    fn test_partial_path_is_not_fused() {
        let (pipeline, fetched) = run_preprocess(true, &["rc"]);
        assert_eq!(pipeline.executor().graph().unwrap().op_nodes().len(), 3);
        assert_eq!(fetched[0].read().get(0).unwrap().shape(), &[3, 3, 16, 16]);
    }
}

#[cfg(test)]
mod test_buffer_queue {
    use super::*;

    fn samples(outputs: &[SharedTensorList]) -> usize {
        outputs[0].read().get(0).unwrap().shape()[0]
    }

    #[test]
    fn test_queue_depth_bounds_runs_in_flight() {
        let mut pipeline = Pipeline::new(context(), 4, 1, 2, false).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();

        pipeline.run(feed(frames(1, 10, 10)), false).unwrap();
        pipeline.run(feed(frames(2, 10, 10)), false).unwrap();
        // both slots ready, none free
        let err = pipeline.run(feed(frames(3, 10, 10)), false).unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));

        let first = pipeline.outputs().unwrap();
        assert_eq!(samples(&first), 1);
        // the shared slot frees up on the next fetch, not before
        assert!(matches!(
            pipeline.run(feed(frames(3, 10, 10)), false),
            Err(PipelineError::Timeout(_))
        ));

        let second = pipeline.outputs().unwrap();
        assert_eq!(samples(&second), 2);
        assert!(!Arc::ptr_eq(&first[0], &second[0]));

        // timed-out runs left nothing queued, so this run sees its own batch
        pipeline.run(feed(frames(4, 10, 10)), false).unwrap();
        let third = pipeline.outputs().unwrap();
        assert_eq!(samples(&third), 4);
        assert!(Arc::ptr_eq(&first[0], &third[0]));
    }

    #[test]
    fn test_timed_out_run_does_not_feed() {
        let mut pipeline = Pipeline::new(context(), 4, 1, 2, false).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();
        pipeline.run(feed(frames(1, 8, 8)), false).unwrap();
        pipeline.run(feed(frames(1, 8, 8)), false).unwrap();
        for _ in 0..3 {
            assert!(matches!(
                pipeline.run(feed(frames(2, 8, 8)), false),
                Err(PipelineError::Timeout(_))
            ));
        }
        pipeline.outputs().unwrap();
        pipeline.outputs().unwrap();

        // a run without inputs finds its source empty
        let err = pipeline.run(HashMap::new(), false).unwrap_err();
        assert!(matches!(err, PipelineError::Operator { .. }));
    }

    #[test]
    fn test_outputs_before_run_times_out() {
        let mut pipeline = Pipeline::new(context(), 1, 1, 3, false).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();
        assert!(matches!(pipeline.outputs(), Err(PipelineError::Timeout(_))));
    }

    #[test]
    fn test_concurrent_run_and_fetch() {
        let mut pipeline = Pipeline::new(context(), 2, threads(), 4, true).unwrap();
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();
        let pipeline = Arc::new(pipeline);

        let producer = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                let mut done = 0;
                while done < 8 {
                    match pipeline.run(feed(frames(2, 12, 12)), false) {
                        Ok(()) => done += 1,
                        Err(PipelineError::Timeout(_)) => continue,
                        Err(e) => panic!("run failed: {}", e),
                    }
                }
            })
        };

        let mut fetched = 0;
        while fetched < 8 {
            match pipeline.outputs() {
                Ok(outputs) => {
                    assert_eq!(outputs[0].read().get(0).unwrap().shape(), &[2, 3, 12, 12]);
                    fetched += 1;
                }
                Err(PipelineError::Timeout(_)) => continue,
                Err(e) => panic!("outputs failed: {}", e),
            }
        }
        producer.join().unwrap();
    }
}

#[cfg(test)]
mod test_build_errors {
    use super::*;

    fn build(specs: Vec<OpSpec>, outputs: &[&str]) -> PipelineError {
        let mut pipeline = Pipeline::new(context(), 1, 1, 2, true).unwrap();
        pipeline.build(specs, outputs).unwrap_err()
    }

    #[test]
    fn test_unknown_operator() {
        let specs = vec![OpSpec::new("tom").with_output("raw", "cpu")];
        assert_eq!(build(specs, &["raw"]), PipelineError::UnknownOperator("tom".to_string()));
    }

    #[test]
    fn test_unknown_output() {
        assert!(matches!(build(to_tensor_specs(), &["tom"]), PipelineError::Build(_)));
    }

    #[test]
    fn test_duplicate_data_node() {
        let mut specs = to_tensor_specs();
        specs.push(OpSpec::new("ExternalSource").with_output("t", "cpu"));
        assert!(matches!(build(specs, &["t"]), PipelineError::Build(_)));
    }

    #[test]
    fn test_dangling_input() {
        let specs = vec![OpSpec::new("ToTensor")
            .with_input("missing", "cpu")
            .with_output("t", "cpu")];
        let err = build(specs, &["t"]);
        assert!(err.is_build_error());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_overlong_spec_string() {
        let specs = vec![OpSpec::new("ExternalSource").with_output("r".repeat(2048), "cpu")];
        assert!(matches!(build(specs, &["raw"]), PipelineError::Build(_)));
    }

    #[test]
    fn test_failed_build_leaves_pipeline_unbuilt() {
        let mut pipeline = Pipeline::new(context(), 1, 1, 2, true).unwrap();
        assert!(pipeline.build(to_tensor_specs(), &["tom"]).is_err());
        assert!(pipeline.graph_summary().is_none());
        pipeline.build(to_tensor_specs(), &["t"]).unwrap();
    }
}
