use anyhow::{Result, bail};

/// Grid cell coordinates `(x, y)`.
pub type Pos = (usize, usize);

/// Multi-occupancy grid.
///
/// Each cell holds the ids of the agents standing on it, in placement order.
/// Neighborhoods are Moore (Chebyshev) squares and wrap around the edges
/// when the grid is a torus.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    torus: bool,
    cells: Vec<Vec<usize>>,
}

impl Grid {
    pub fn new(width: usize, height: usize, torus: bool) -> Self {
        Self {
            width,
            height,
            torus,
            cells: vec![Vec::new(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Ids of the agents on `pos`.
    pub fn cell(&self, pos: Pos) -> &[usize] {
        &self.cells[self.index(pos)]
    }

    /// Iterate over every cell position in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Pos> + use<> {
        let (width, height) = (self.width, self.height);
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y)))
    }

    pub fn place_agent(&mut self, id: usize, pos: Pos) -> Result<()> {
        self.check_pos(pos)?;
        let idx = self.index(pos);
        if self.cells[idx].contains(&id) {
            bail!("agent {id} is already placed on {pos:?}");
        }
        self.cells[idx].push(id);
        Ok(())
    }

    pub fn remove_agent(&mut self, id: usize, pos: Pos) -> Result<()> {
        self.check_pos(pos)?;
        let idx = self.index(pos);
        let Some(slot) = self.cells[idx].iter().position(|&other| other == id) else {
            bail!("agent {id} is not placed on {pos:?}");
        };
        self.cells[idx].remove(slot);
        Ok(())
    }

    pub fn move_agent(&mut self, id: usize, from: Pos, to: Pos) -> Result<()> {
        self.check_pos(to)?;
        self.remove_agent(id, from)?;
        self.place_agent(id, to)
    }

    /// Cells within Chebyshev distance `radius` of `pos`, `pos` included.
    ///
    /// Each cell is yielded once even when the radius spans the whole torus.
    pub fn neighborhood(&self, pos: Pos, radius: usize) -> impl Iterator<Item = Pos> + use<> {
        let xs = self.axis_span(pos.0, radius, self.width);
        let ys = self.axis_span(pos.1, radius, self.height);
        ys.into_iter()
            .flat_map(move |y| xs.clone().into_iter().map(move |x| (x, y)))
    }

    /// Ids of all agents in the neighborhood of `pos`.
    pub fn agents_within(&self, pos: Pos, radius: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighborhood(pos, radius)
            .flat_map(move |cell| self.cell(cell).iter().copied())
    }

    fn axis_span(&self, center: usize, radius: usize, len: usize) -> Vec<usize> {
        if self.torus {
            if 2 * radius + 1 >= len {
                return (0..len).collect();
            }
            (0..=2 * radius)
                .map(|k| (center + len - radius + k) % len)
                .collect()
        } else {
            let lo = center.saturating_sub(radius);
            let hi = (center + radius).min(len - 1);
            (lo..=hi).collect()
        }
    }

    fn check_pos(&self, pos: Pos) -> Result<()> {
        if pos.0 >= self.width || pos.1 >= self.height {
            bail!(
                "cell {pos:?} is outside the {}x{} grid",
                self.width,
                self.height
            );
        }
        Ok(())
    }

    fn index(&self, pos: Pos) -> usize {
        pos.1 * self.width + pos.0
    }
}
