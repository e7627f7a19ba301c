//! PCM 采样缓冲区.
//!
//! 编码器的输入: `frames × channels` 个 f32 采样, 名义范围 [-1.0, 1.0].
//! 支持交错 (LRLR...) 和平面 (每声道一个数组) 两种布局, 零帧输入合法.

use crate::{QinError, QinResult};

/// 采样布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmLayout {
    /// 交错: 同一时刻的各声道采样相邻
    Interleaved,
    /// 平面: 每个声道独立存放
    Planar,
}

#[derive(Debug, Clone)]
enum Storage {
    Interleaved(Vec<f32>),
    Planar(Vec<Vec<f32>>),
}

/// PCM 采样缓冲区
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    channels: usize,
    frames: usize,
    storage: Storage,
}

impl PcmBuffer {
    /// 从交错采样创建
    ///
    /// 采样总数必须是声道数的整数倍.
    pub fn from_interleaved(samples: Vec<f32>, channels: usize) -> QinResult<Self> {
        if channels == 0 {
            return Err(QinError::InvalidConfiguration("声道数不能为 0".into()));
        }
        if samples.len() % channels != 0 {
            return Err(QinError::MalformedInput(format!(
                "交错采样数 {} 不是声道数 {} 的整数倍",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            channels,
            frames: samples.len() / channels,
            storage: Storage::Interleaved(samples),
        })
    }

    /// 从平面采样创建, 每个声道长度必须一致
    pub fn from_planar(planes: Vec<Vec<f32>>) -> QinResult<Self> {
        let Some(first) = planes.first() else {
            return Err(QinError::InvalidConfiguration("声道数不能为 0".into()));
        };
        let frames = first.len();
        if let Some((ch, plane)) = planes.iter().enumerate().find(|(_, p)| p.len() != frames) {
            return Err(QinError::MalformedInput(format!(
                "声道 {} 长度 {} 与声道 0 长度 {} 不一致",
                ch,
                plane.len(),
                frames
            )));
        }
        Ok(Self {
            channels: planes.len(),
            frames,
            storage: Storage::Planar(planes),
        })
    }

    /// 从 16 位有符号交错采样创建, 按 1/32768 归一化
    pub fn from_i16_interleaved(samples: &[i16], channels: usize) -> QinResult<Self> {
        let converted = samples.iter().map(|&s| f32::from(s) / 32768.0).collect();
        Self::from_interleaved(converted, channels)
    }

    /// 创建零帧缓冲区
    pub fn empty(channels: usize) -> QinResult<Self> {
        Self::from_interleaved(Vec::new(), channels)
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 每声道采样数
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// 是否为零帧输入
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// 存储布局
    pub fn layout(&self) -> PcmLayout {
        match self.storage {
            Storage::Interleaved(_) => PcmLayout::Interleaved,
            Storage::Planar(_) => PcmLayout::Planar,
        }
    }

    /// 按声道遍历采样, 声道越界返回 `None`
    pub fn channel(&self, ch: usize) -> Option<impl Iterator<Item = f32> + '_> {
        if ch >= self.channels {
            return None;
        }
        let iter = match &self.storage {
            Storage::Interleaved(data) => data.get(ch..).unwrap_or(&[]).iter().step_by(self.channels),
            Storage::Planar(planes) => planes[ch].iter().step_by(1),
        };
        Some(iter.copied())
    }

    /// 转为平面布局的副本
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        (0..self.channels)
            .map(|ch| {
                self.channel(ch)
                    .map(|samples| samples.collect::<Vec<f32>>())
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_交错缓冲区() {
        let pcm = PcmBuffer::from_interleaved(vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2).unwrap();
        assert_eq!(pcm.channels(), 2);
        assert_eq!(pcm.frames(), 3);
        assert_eq!(pcm.layout(), PcmLayout::Interleaved);
        let right: Vec<f32> = pcm.channel(1).unwrap().collect();
        assert_eq!(right, vec![-0.1, -0.2, -0.3]);
        assert!(pcm.channel(2).is_none());
    }

    #[test]
    fn test_交错长度不匹配() {
        let err = PcmBuffer::from_interleaved(vec![0.0; 5], 2).unwrap_err();
        assert!(matches!(err, QinError::MalformedInput(_)));
    }

    #[test]
    fn test_零声道() {
        assert!(matches!(
            PcmBuffer::from_interleaved(Vec::new(), 0),
            Err(QinError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            PcmBuffer::from_planar(Vec::new()),
            Err(QinError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_平面缓冲区() {
        let pcm = PcmBuffer::from_planar(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(pcm.layout(), PcmLayout::Planar);
        assert_eq!(pcm.to_planar(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let err = PcmBuffer::from_planar(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, QinError::MalformedInput(_)));
    }

    #[test]
    fn test_i16_归一化() {
        let pcm = PcmBuffer::from_i16_interleaved(&[i16::MIN, 0, 16384], 1).unwrap();
        assert_eq!(pcm.to_planar(), vec![vec![-1.0, 0.0, 0.5]]);
    }

    #[test]
    fn test_零帧合法() {
        let pcm = PcmBuffer::empty(2).unwrap();
        assert!(pcm.is_empty());
        assert_eq!(pcm.to_planar(), vec![Vec::<f32>::new(), Vec::new()]);
    }
}
