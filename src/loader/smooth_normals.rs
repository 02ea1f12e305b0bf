//! Smooth normals for meshes that were imported without any.

use std::collections::HashMap;

use ultraviolet::Vec3;

/// Positions closer than this are treated as the same point.
const POSITION_QUANTIZATION: f32 = 10000.0;

/// Averages the area-weighted normals of every face touching a position.
///
/// Vertices that share a position but not an index (split along a UV seam for example)
/// end up with the same normal. Vertices without any non-degenerate face get a zero
/// normal.
pub fn generate(positions: &[[f32; 3]], faces: &[Vec<u32>]) -> Vec<[f32; 3]> {
    let mut group_normals: HashMap<(i32, i32, i32), Vec3> = HashMap::new();
    let groups: Vec<_> = positions.iter().map(|&p| position_key(p)).collect();

    for face in faces {
        let [a, b, c] = match face.as_slice() {
            &[a, b, c] => [a, b, c].map(|index| Vec3::from(positions[index as usize])),
            _ => continue,
        };
        // The cross product is twice the triangle area, which weights larger faces more
        let face_normal = (b - a).cross(c - a);

        for &index in face {
            *group_normals
                .entry(groups[index as usize])
                .or_insert_with(Vec3::zero) += face_normal;
        }
    }

    groups
        .iter()
        .map(|group| {
            let normal = group_normals.get(group).copied().unwrap_or_else(Vec3::zero);
            if normal.mag_sq() > 0.0 {
                normal.normalized().into()
            } else {
                [0.0; 3]
            }
        })
        .collect()
}

fn position_key(p: [f32; 3]) -> (i32, i32, i32) {
    let [x, y, z] = p.map(|v| (v * POSITION_QUANTIZATION).round() as i32);
    (x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_corner_is_averaged() {
        // Two faces of a unit cube meeting at the x axis edge
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            // duplicated corner, as if split along a seam
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let faces = vec![vec![0, 1, 2], vec![3, 4, 5]];

        let normals = generate(&positions, &faces);
        let expected = Vec3::new(0.0, -1.0, 1.0).normalized();
        for index in [0, 1, 3, 4] {
            let normal = Vec3::from(normals[index]);
            assert!((normal - expected).mag() < 1e-5, "{:?}", normal);
        }
        assert_eq!(normals[2], [0.0, 0.0, 1.0]);
        assert_eq!(normals[5], [0.0, -1.0, 0.0]);
    }

    #[test]
    fn unused_vertices_get_zero_normals() {
        let positions = [[0.0, 0.0, 0.0], [5.0, 5.0, 5.0]];
        let normals = generate(&positions, &[]);
        assert_eq!(normals, vec![[0.0; 3]; 2]);
    }
}
