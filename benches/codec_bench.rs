//! Qin 编码器性能基准测试.
//!
//! 覆盖 MDCT 分析、量化组包和 Ogg 封装三段路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use qin::codec::vorbis::QuantizedState;
use qin::{EncoderConfig, PcmBuffer, pcm_to_quantized_state, quantized_state_to_ogg};

const RATE: u32 = 44100;

/// 一秒立体声双音信号
fn make_stereo_pcm() -> PcmBuffer {
    let frames = RATE as usize;
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f32 / RATE as f32;
        let l = (t * 440.0 * std::f32::consts::TAU).sin() * 0.4;
        let r = (t * 660.0 * std::f32::consts::TAU).sin() * 0.3;
        samples.push(l);
        samples.push(r);
    }
    match PcmBuffer::from_interleaved(samples, 2) {
        Ok(pcm) => pcm,
        Err(err) => panic!("构造 PCM 失败: {err}"),
    }
}

fn bench_analyze(c: &mut Criterion) {
    let pcm = make_stereo_pcm();
    for parallel in [false, true] {
        let name = format!("analyze_1s_stereo_parallel_{parallel}");
        c.bench_function(&name, |b| {
            let config = EncoderConfig::default().with_parallel(parallel);
            b.iter(|| {
                let mut state = QuantizedState::new(2, RATE, config.clone()).unwrap();
                state.analyze(black_box(&pcm)).unwrap();
            });
        });
    }
}

fn bench_packetize(c: &mut Criterion) {
    let pcm = make_stereo_pcm();
    c.bench_function("packetize_1s_stereo", |b| {
        b.iter(|| {
            let mut state = pcm_to_quantized_state(&pcm, RATE, EncoderConfig::default()).unwrap();
            state.packetize().unwrap();
            black_box(state.num_packets());
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let pcm = make_stereo_pcm();
    let mut group = c.benchmark_group("encode_1s_stereo");
    for quality in [0.0f32, 0.4, 1.0] {
        group.bench_function(format!("q{quality}"), |b| {
            let config = EncoderConfig::default().with_quality(quality);
            b.iter(|| {
                let mut state = pcm_to_quantized_state(black_box(&pcm), RATE, config.clone()).unwrap();
                black_box(quantized_state_to_ogg(&mut state).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analyze, bench_packetize, bench_encode);
criterion_main!(benches);
