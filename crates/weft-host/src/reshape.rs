//! Inter-layer retiling.
//!
//! The accelerator consumes matrices as a flat sequence of `block_size` ×
//! `block_size` tiles, while convolution layers want `(batch, channel,
//! height, width)` tensors. Between two layers the host turns the previous
//! layer's tiled output back into a matrix, rearranges it into a tensor,
//! lowers the convolution to a matrix multiply with `im2row`, and re-tiles
//! the result for the next layer. [`reshape`] runs the whole pipeline; the
//! individual steps are exposed for host code that needs only part of it.

/// Row-major 2-D matrix of quantized values.
pub type Matrix = Vec<Vec<i8>>;
/// `(batch, channel, height, width)` tensor.
pub type Tensor4 = Vec<Vec<Matrix>>;

/// Grid of tiles: `grid[row][col]` is one `block_size`-wide tile (the last
/// row of tiles may be shorter than `block_size`).
pub type BlockGrid = Vec<Vec<Matrix>>;

/// Parameters for the composed [`reshape`] pipeline.
#[derive(Debug, Clone)]
pub struct ReshapeConfig {
    /// Tiles per row in the incoming flat sequence.
    pub block_col: usize,
    /// Tile edge length (the hardware block size).
    pub block_size: usize,
    /// Unpadded height of the previous layer's result matrix.
    pub out_matrix_height: usize,
    /// Unpadded width of the previous layer's result matrix.
    pub out_matrix_width: usize,
    pub batch_size: usize,
    pub out_tensor_channel: usize,
    pub out_tensor_height: usize,
    pub out_tensor_width: usize,
    /// Next layer's kernel as `(height, width)`.
    pub kernel: (usize, usize),
    pub stride: usize,
    /// Pad the row count up to a tile multiple as well as the columns.
    pub square: bool,
}

/// Split a flat tile sequence into a grid of `block_size`-square tiles,
/// `block_col` tiles per row. A trailing remainder becomes one last row of
/// shorter tiles, zero-padded up to whole rows.
pub fn to_blocks(vector: &[i8], block_col: usize, block_size: usize) -> BlockGrid {
    let per_full_row = block_col * block_size * block_size;
    let full_rows = vector.len() / per_full_row;
    let remaining = vector.len() % per_full_row;

    let mut grid = Vec::with_capacity(full_rows + usize::from(remaining > 0));
    for i in 0..full_rows {
        let mut row = Vec::with_capacity(block_col);
        for j in 0..block_col {
            let start = (i * block_col + j) * block_size * block_size;
            let block = (0..block_size)
                .map(|r| {
                    let row_start = start + r * block_size;
                    vector[row_start..row_start + block_size].to_vec()
                })
                .collect();
            row.push(block);
        }
        grid.push(row);
    }

    if remaining > 0 {
        let per_block = remaining / block_col;
        let subheight = per_block / block_size;
        let base = full_rows * per_full_row;
        let mut row = Vec::with_capacity(block_col);
        for j in 0..block_col {
            let start = base + j * per_block;
            let mut flat: Vec<i8> = vector[start..vector.len().min(start + per_block)].to_vec();
            flat.resize(subheight * block_size, 0);
            let block = flat.chunks(block_size).map(<[i8]>::to_vec).collect();
            row.push(block);
        }
        grid.push(row);
    }
    grid
}

/// Rebuild the `height` × `width` matrix a tile grid was cut from,
/// dropping tile padding.
pub fn unsplit(grid: &BlockGrid, block_size: usize, height: usize, width: usize) -> Matrix {
    let mut matrix = vec![vec![0i8; width]; height];
    for (i, row) in matrix.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            let (tile_row, r) = (i / block_size, i % block_size);
            let (tile_col, c) = (j / block_size, j % block_size);
            if let Some(block) = grid.get(tile_row).and_then(|row| row.get(tile_col)) {
                if let Some(&cell) = block.get(r).and_then(|line| line.get(c)) {
                    *value = cell;
                }
            }
        }
    }
    matrix
}

/// Rearrange a result matrix into a `(batch, channel, height, width)`
/// tensor, column-major over the matrix (the transpose-then-reshape of the
/// reference implementation).
pub fn mat_to_tensor(
    matrix: &Matrix,
    batch_size: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Tensor4 {
    let mut tensor =
        vec![vec![vec![vec![0i8; width]; height]; channels]; batch_size];
    let rows = matrix.len();
    let cols = matrix.first().map_or(0, Vec::len);

    let mut idx = 0usize;
    for h in 0..cols {
        for w in 0..rows {
            let b = idx / (channels * height * width);
            let rem = idx % (channels * height * width);
            let c = rem / (height * width);
            let rem = rem % (height * width);
            let (y, x) = (rem / width, rem % width);
            if b < batch_size {
                tensor[b][c][y][x] = matrix[w][h];
            }
            idx += 1;
        }
    }
    tensor
}

/// Lower a convolution input to a matrix: one row per output position, one
/// column per `(channel, ky, kx)` tap.
pub fn im2row(tensor: &Tensor4, kernel: (usize, usize), stride: usize) -> Matrix {
    let batch_size = tensor.len();
    let channels = tensor[0].len();
    let in_h = tensor[0][0].len();
    let in_w = tensor[0][0][0].len();
    let (kh, kw) = kernel;

    let out_h = (in_h - kh) / stride + 1;
    let out_w = (in_w - kw) / stride + 1;
    let mut matrix = Vec::with_capacity(batch_size * out_h * out_w);
    for b in 0..batch_size {
        for i in (0..=in_h - kh).step_by(stride) {
            for j in (0..=in_w - kw).step_by(stride) {
                let mut row = Vec::with_capacity(channels * kh * kw);
                for c in 0..channels {
                    for ki in 0..kh {
                        row.extend_from_slice(&tensor[b][c][i + ki][j..j + kw]);
                    }
                }
                matrix.push(row);
            }
        }
    }
    matrix
}

/// Zero-pad a matrix so its width (and, for weights or square layouts, its
/// height) is a multiple of `block_size`.
pub fn pad_matrix(matrix: &Matrix, block_size: usize, weight: bool, square: bool) -> Matrix {
    let rows = matrix.len();
    let cols = matrix[0].len();
    let target_rows = if weight || square {
        rows.div_ceil(block_size) * block_size
    } else {
        rows
    };
    let target_cols = cols.div_ceil(block_size) * block_size;

    let mut padded = vec![vec![0i8; target_cols]; target_rows];
    for (dst, src) in padded.iter_mut().zip(matrix) {
        dst[..cols].copy_from_slice(src);
    }
    padded
}

/// Cut a padded matrix into tiles, row-major. Weight and square layouts
/// require exact `block_size`-square tiling; otherwise the last row of
/// tiles may be shorter. Returns the tiles and the tile-grid width.
pub fn split_matrix(
    matrix: &Matrix,
    block_size: usize,
    weight: bool,
    square: bool,
) -> (Vec<Matrix>, usize) {
    let rows = matrix.len();
    let cols = matrix[0].len();
    assert!(
        cols % block_size == 0,
        "matrix width {cols} is not a multiple of the block size {block_size}"
    );
    if weight || square {
        assert!(
            rows % block_size == 0,
            "matrix height {rows} is not a multiple of the block size {block_size}"
        );
    }

    let blocks_col = cols / block_size;
    let blocks_row = rows.div_ceil(block_size);
    let mut blocks = Vec::with_capacity(blocks_row * blocks_col);
    for i in 0..blocks_row {
        let row_end = rows.min((i + 1) * block_size);
        for j in 0..blocks_col {
            let block = matrix[i * block_size..row_end]
                .iter()
                .map(|row| row[j * block_size..(j + 1) * block_size].to_vec())
                .collect();
            blocks.push(block);
        }
    }
    (blocks, blocks_col)
}

/// Full inter-layer pipeline: tiles → matrix → tensor → `im2row` matrix →
/// padded matrix → tiles, flattened back into the layout the next layer's
/// loads expect.
pub fn reshape(vector: &[i8], cfg: &ReshapeConfig) -> Vec<i8> {
    let grid = to_blocks(vector, cfg.block_col, cfg.block_size);
    let matrix = unsplit(&grid, cfg.block_size, cfg.out_matrix_height, cfg.out_matrix_width);
    let tensor = mat_to_tensor(
        &matrix,
        cfg.batch_size,
        cfg.out_tensor_channel,
        cfg.out_tensor_height,
        cfg.out_tensor_width,
    );
    let lowered = im2row(&tensor, cfg.kernel, cfg.stride);
    let padded = pad_matrix(&lowered, cfg.block_size, false, cfg.square);
    let (blocks, _) = split_matrix(&padded, cfg.block_size, false, cfg.square);

    blocks.into_iter().flatten().flatten().collect()
}
