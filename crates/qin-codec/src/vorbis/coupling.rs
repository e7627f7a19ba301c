//! 立体声平方极坐标耦合.
//!
//! 在量化后的整数残差上进行, 解码端按 Vorbis 逆耦合规则无损还原:
//! 声道 0 为幅度 (magnitude), 声道 1 为角度 (angle).

use super::residue::RESIDUE_MAX_MAGNITUDE;

/// 对一对残差值耦合, 返回 (幅度, 角度)
pub fn couple(left: i32, right: i32) -> (i32, i32) {
    if left.abs() > right.abs() {
        let angle = if left > 0 { left - right } else { right - left };
        (left, angle)
    } else {
        let angle = if right > 0 { left - right } else { right - left };
        (right, angle)
    }
}

/// 逆耦合 (解码端规则), 返回 (左, 右)
pub fn decouple(magnitude: i32, angle: i32) -> (i32, i32) {
    if magnitude > 0 {
        if angle > 0 {
            (magnitude, magnitude - angle)
        } else {
            (magnitude + angle, magnitude)
        }
    } else if angle > 0 {
        (magnitude, magnitude + angle)
    } else {
        (magnitude - angle, magnitude)
    }
}

/// 耦合两个声道的整数残差
///
/// 结果限制在 ±[`RESIDUE_MAX_MAGNITUDE`] 内, 返回 (幅度向量, 角度向量, 被截断的值个数).
pub fn couple_channels(left: &[i32], right: &[i32]) -> (Vec<i32>, Vec<i32>, u64) {
    let mut clamped = 0u64;
    let mut clamp = |v: i32| {
        let c = v.clamp(-RESIDUE_MAX_MAGNITUDE, RESIDUE_MAX_MAGNITUDE);
        if c != v {
            clamped += 1;
        }
        c
    };
    let (magnitude, angle): (Vec<i32>, Vec<i32>) = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| {
            let (m, a) = couple(l, r);
            (clamp(m), clamp(a))
        })
        .unzip();
    (magnitude, angle, clamped)
}
