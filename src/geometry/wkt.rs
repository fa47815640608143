use crate::geometry::GeometryValidator;
use std::f64::consts::PI;

const KM_PER_DEGREE: f64 = 111.0;
const BUFFER_SEGMENTS: usize = 32;

/// Built-in validator for the WKT subset the NSRDB discovery endpoint accepts:
/// `POINT`, `MULTIPOINT`, `POLYGON` and `MULTIPOLYGON` in longitude/latitude
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct WktGeometry;

impl GeometryValidator for WktGeometry {
    fn is_valid(&self, wkt: &str) -> bool {
        parse(wkt).is_some()
    }

    fn to_location_seed(&self, wkt: &str) -> String {
        match parse(wkt) {
            Some((kind, body)) => format!("{}{}", kind.tag(), render(&body)),
            None => wkt.trim().to_string(),
        }
    }
}

/// `POINT(lon lat)` for a latitude/longitude pair.
pub fn point_wkt(lat: f64, lon: f64) -> String {
    format!("POINT({} {})", lon, lat)
}

/// A closed polygon approximating a circle of `buffer_km` around the point.
/// Degrees are derived from kilometres with a flat 111 km per degree.
pub fn buffered_point_wkt(lat: f64, lon: f64, buffer_km: f64) -> String {
    if buffer_km <= 0.0 {
        return point_wkt(lat, lon);
    }
    let radius = buffer_km / KM_PER_DEGREE;
    let mut ring: Vec<String> = (0..BUFFER_SEGMENTS)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / BUFFER_SEGMENTS as f64;
            format!(
                "{:.6} {:.6}",
                lon + radius * angle.cos(),
                lat + radius * angle.sin()
            )
        })
        .collect();
    ring.push(ring[0].clone());
    format!("POLYGON(({}))", ring.join(", "))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Point,
    MultiPoint,
    Polygon,
    MultiPolygon,
}

impl Kind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "POINT" => Some(Kind::Point),
            "MULTIPOINT" => Some(Kind::MultiPoint),
            "POLYGON" => Some(Kind::Polygon),
            "MULTIPOLYGON" => Some(Kind::MultiPolygon),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Kind::Point => "POINT",
            Kind::MultiPoint => "MULTIPOINT",
            Kind::Polygon => "POLYGON",
            Kind::MultiPolygon => "MULTIPOLYGON",
        }
    }
}

/// Either a parenthesised list or a bare coordinate tuple.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    List(Vec<Node>),
    Coord(Vec<f64>),
}

fn parse(wkt: &str) -> Option<(Kind, Node)> {
    let text = wkt.trim();
    let open = text.find('(')?;
    let kind = Kind::from_tag(text[..open].trim())?;
    let mut parser = Parser {
        chars: text[open..].chars().collect(),
        pos: 0,
    };
    let body = parser.list()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return None;
    }
    validate(kind, &body).then_some((kind, body))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn list(&mut self) -> Option<Node> {
        if !self.eat('(') {
            return None;
        }
        let mut items = vec![self.item()?];
        while self.eat(',') {
            items.push(self.item()?);
        }
        self.eat(')').then_some(Node::List(items))
    }

    fn item(&mut self) -> Option<Node> {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&'(') {
            self.list()
        } else {
            self.coord()
        }
    }

    fn coord(&mut self) -> Option<Node> {
        let mut values = Vec::with_capacity(2);
        loop {
            self.skip_ws();
            let start = self.pos;
            while self
                .chars
                .get(self.pos)
                .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
            {
                self.pos += 1;
            }
            if start == self.pos {
                break;
            }
            let token: String = self.chars[start..self.pos].iter().collect();
            values.push(token.parse::<f64>().ok().filter(|v| v.is_finite())?);
        }
        (2..=3).contains(&values.len()).then_some(Node::Coord(values))
    }
}

fn in_range(coord: &[f64]) -> bool {
    let (lon, lat) = (coord[0], coord[1]);
    (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

fn as_point(node: &Node) -> Option<&[f64]> {
    match node {
        Node::Coord(c) => Some(c),
        Node::List(items) if items.len() == 1 => match &items[0] {
            Node::Coord(c) => Some(c),
            Node::List(_) => None,
        },
        Node::List(_) => None,
    }
}

fn valid_ring(node: &Node) -> bool {
    let Node::List(points) = node else {
        return false;
    };
    let coords: Option<Vec<&[f64]>> = points
        .iter()
        .map(|p| match p {
            Node::Coord(c) => Some(c.as_slice()),
            Node::List(_) => None,
        })
        .collect();
    let Some(coords) = coords else {
        return false;
    };
    coords.len() >= 4
        && coords.iter().all(|c| in_range(c))
        && coords.first().map(|c| &c[..2]) == coords.last().map(|c| &c[..2])
}

fn valid_polygon(node: &Node) -> bool {
    match node {
        Node::List(rings) => rings.iter().all(valid_ring),
        Node::Coord(_) => false,
    }
}

fn validate(kind: Kind, body: &Node) -> bool {
    let Node::List(items) = body else {
        return false;
    };
    match kind {
        Kind::Point => as_point(body).is_some_and(in_range),
        Kind::MultiPoint => items.iter().all(|item| as_point(item).is_some_and(in_range)),
        Kind::Polygon => valid_polygon(body),
        Kind::MultiPolygon => items.iter().all(valid_polygon),
    }
}

fn render(node: &Node) -> String {
    match node {
        Node::Coord(values) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" "),
        Node::List(items) => format!(
            "({})",
            items.iter().map(render).collect::<Vec<_>>().join(", ")
        ),
    }
}
