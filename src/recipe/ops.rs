/// Closed set of recordable operations for schema version 1.x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Connected line (`line` is accepted as an alias).
    Plot,
    /// Step line.
    Step,
    /// Marker scatter.
    Scatter,
    /// Vertical bars.
    Bar,
    /// Horizontal bars.
    Barh,
    /// Histogram.
    Hist,
    /// Region between two curves.
    FillBetween,
    /// Line with error bars.
    Errorbar,
    /// Stacked areas.
    Stackplot,
    /// Pie chart.
    Pie,
    /// Box-and-whisker plot.
    Boxplot,
    /// Violin plot.
    Violinplot,
    /// Image from a 2-D array.
    Imshow,
    /// Value labels on an existing bar container.
    BarLabel,
    /// Panel title.
    SetTitle,
    /// X axis label.
    SetXlabel,
    /// Y axis label.
    SetYlabel,
    /// X data limits.
    SetXlim,
    /// Y data limits.
    SetYlim,
    /// Legend for labelled elements.
    Legend,
    /// Grid lines.
    Grid,
    /// Horizontal reference line.
    Axhline,
    /// Vertical reference line.
    Axvline,
    /// Free text.
    Text,
    /// Text with an optional arrow to a point.
    Annotate,
    /// Significance bracket between two positions.
    StatAnnotation,
}

impl Operation {
    /// Every supported operation.
    pub const ALL: [Operation; 26] = [
        Self::Plot,
        Self::Step,
        Self::Scatter,
        Self::Bar,
        Self::Barh,
        Self::Hist,
        Self::FillBetween,
        Self::Errorbar,
        Self::Stackplot,
        Self::Pie,
        Self::Boxplot,
        Self::Violinplot,
        Self::Imshow,
        Self::BarLabel,
        Self::SetTitle,
        Self::SetXlabel,
        Self::SetYlabel,
        Self::SetXlim,
        Self::SetYlim,
        Self::Legend,
        Self::Grid,
        Self::Axhline,
        Self::Axvline,
        Self::Text,
        Self::Annotate,
        Self::StatAnnotation,
    ];

    /// Resolve a recorded operation name.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "line" {
            return Some(Self::Plot);
        }
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Canonical operation name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Plot => "plot",
            Self::Step => "step",
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Barh => "barh",
            Self::Hist => "hist",
            Self::FillBetween => "fill_between",
            Self::Errorbar => "errorbar",
            Self::Stackplot => "stackplot",
            Self::Pie => "pie",
            Self::Boxplot => "boxplot",
            Self::Violinplot => "violinplot",
            Self::Imshow => "imshow",
            Self::BarLabel => "bar_label",
            Self::SetTitle => "set_title",
            Self::SetXlabel => "set_xlabel",
            Self::SetYlabel => "set_ylabel",
            Self::SetXlim => "set_xlim",
            Self::SetYlim => "set_ylim",
            Self::Legend => "legend",
            Self::Grid => "grid",
            Self::Axhline => "axhline",
            Self::Axvline => "axvline",
            Self::Text => "text",
            Self::Annotate => "annotate",
            Self::StatAnnotation => "stat_annotation",
        }
    }

    /// `true` for post-hoc styling and annotation operations.
    pub fn is_decoration(self) -> bool {
        matches!(
            self,
            Self::SetTitle
                | Self::SetXlabel
                | Self::SetYlabel
                | Self::SetXlim
                | Self::SetYlim
                | Self::Legend
                | Self::Grid
                | Self::Axhline
                | Self::Axvline
                | Self::Text
                | Self::Annotate
                | Self::StatAnnotation
        )
    }

    /// Variable names for positional arguments, in order.
    pub fn positional_names(self) -> &'static [&'static str] {
        match self {
            Self::Plot | Self::Step | Self::Scatter => &["x", "y"],
            Self::Bar => &["x", "height"],
            Self::Barh => &["y", "width"],
            Self::Hist | Self::Pie => &["x"],
            Self::FillBetween => &["x", "y1", "y2"],
            Self::Errorbar => &["x", "y", "yerr"],
            Self::Stackplot => &["x", "ys"],
            Self::Boxplot | Self::Violinplot => &["data"],
            Self::Imshow => &["z"],
            Self::BarLabel => &["container"],
            Self::SetTitle | Self::SetXlabel | Self::SetYlabel => &["label"],
            Self::SetXlim | Self::SetYlim => &["lo", "hi"],
            Self::Legend | Self::Grid => &[],
            Self::Axhline => &["y"],
            Self::Axvline => &["x"],
            Self::Text => &["x", "y", "s"],
            Self::Annotate => &["text", "xy"],
            Self::StatAnnotation => &["x1", "x2", "y", "text"],
        }
    }

    /// Variable name for positional argument `index`.
    pub fn positional_name(self, index: usize) -> String {
        self.positional_names()
            .get(index)
            .map(|s| (*s).to_owned())
            .unwrap_or_else(|| format!("arg{index}"))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
